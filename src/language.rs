// src/language.rs

//! Supported languages and their static metadata.
//!
//! The table in this module is a `const` array: it is built at compile time,
//! never mutated, and safe to read from any number of tasks without locking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::runner::RunError;

/// A language the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
}

/// Display metadata for a language (name, extension, blurb).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LanguageInfo {
    pub language: Language,
    pub name: &'static str,
    pub extension: &'static str,
    pub description: &'static str,
    pub features: &'static str,
    /// Prefix used for single-line comments.
    pub line_comment: &'static str,
}

pub const LANGUAGES: [LanguageInfo; 3] = [
    LanguageInfo {
        language: Language::Python,
        name: "Python",
        extension: "py",
        description: "High-level, interpreted programming language",
        features: "Dynamic typing, extensive libraries, readable syntax",
        line_comment: "#",
    },
    LanguageInfo {
        language: Language::JavaScript,
        name: "JavaScript",
        extension: "js",
        description: "Dynamic language for web development",
        features: "Event-driven, functional programming, web APIs",
        line_comment: "//",
    },
    LanguageInfo {
        language: Language::Java,
        name: "Java",
        extension: "java",
        description: "Object-oriented, platform-independent language",
        features: "Strong typing, JVM, enterprise applications",
        line_comment: "//",
    },
];

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::Java];

    pub fn info(self) -> &'static LanguageInfo {
        match self {
            Language::Python => &LANGUAGES[0],
            Language::JavaScript => &LANGUAGES[1],
            Language::Java => &LANGUAGES[2],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
        }
    }

    /// Infer a language from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            _ => Err(RunError::UnsupportedLanguage(s.to_string())),
        }
    }
}
