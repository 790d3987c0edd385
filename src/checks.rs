// src/checks.rs

//! Pre-run checks and code statistics.
//!
//! Cheap, toolchain-free checks run before a submission is executed.
//! Exceeding the size limit is the only hard error; everything else
//! (empty code, unbalanced brackets, a missing Java class) is a warning.
//!
//! None of this replaces the compiler: a clean precheck does not mean the
//! code will compile.

use serde::{Deserialize, Serialize};

use crate::language::Language;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecheckReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStatistics {
    pub total_lines: usize,
    pub non_empty_lines: usize,
    pub comment_lines: usize,
    pub character_count: usize,
}

/// Check a submission before running it.
///
/// `max_len` is the configured `max_code_length`, in characters.
pub fn precheck(source: &str, language: Language, max_len: usize) -> PrecheckReport {
    let mut report = PrecheckReport {
        is_valid: true,
        ..PrecheckReport::default()
    };

    let len = source.chars().count();
    if len > max_len {
        report.is_valid = false;
        report.errors.push(format!(
            "Code is {} characters long; the limit is {}",
            len, max_len
        ));
    }

    if source.trim().is_empty() {
        report.warnings.push("Code is empty".to_string());
        return report;
    }

    match language {
        Language::Java => {
            if !source.contains("class") {
                report
                    .warnings
                    .push("Java code typically requires a class declaration".to_string());
            }
            if !source.contains("static void main") {
                report
                    .warnings
                    .push("No `public static void main` method found".to_string());
            }
            check_brackets(source, &mut report);
        }
        Language::JavaScript | Language::Python => check_brackets(source, &mut report),
    }

    report
}

fn check_brackets(source: &str, report: &mut PrecheckReport) {
    let pairs = [
        ('{', '}', "curly braces"),
        ('(', ')', "parentheses"),
        ('[', ']', "square brackets"),
    ];

    for (open, close, name) in pairs {
        let opened = source.chars().filter(|c| *c == open).count();
        let closed = source.chars().filter(|c| *c == close).count();
        if opened != closed {
            report.warnings.push(format!(
                "Mismatched {} ({} '{}' vs {} '{}')",
                name, opened, open, closed, close
            ));
        }
    }
}

/// Count lines, non-empty lines and comment lines.
pub fn code_statistics(source: &str, language: Language) -> CodeStatistics {
    if source.is_empty() {
        return CodeStatistics::default();
    }

    let comment = language.info().line_comment;
    let lines: Vec<&str> = source.split('\n').collect();

    CodeStatistics {
        total_lines: lines.len(),
        non_empty_lines: lines.iter().filter(|l| !l.trim().is_empty()).count(),
        comment_lines: lines
            .iter()
            .filter(|l| l.trim_start().starts_with(comment))
            .count(),
        character_count: source.chars().count(),
    }
}

/// Shorten `text` to `max_chars`, ending with "..." when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
