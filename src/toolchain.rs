// src/toolchain.rs

//! Toolchain table: which programs run which language.
//!
//! `Toolchains` is built once from `config.runtime` and then shared as an
//! `Arc<Toolchains>`. Nothing mutates it after construction.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::Runtime;
use crate::encoding::{apply_utf8_env, decode_output, JAVA_UTF8_PROPERTIES};
use crate::language::Language;

/// Placeholders understood by argument templates.
pub const FILE_PLACEHOLDER: &str = "{file}";
pub const DIR_PLACEHOLDER: &str = "{dir}";
pub const CLASS_PLACEHOLDER: &str = "{class}";

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How to build and run one language.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainSpec {
    pub language: Language,
    pub program: String,
    /// Argument template; see the `*_PLACEHOLDER` constants.
    pub args: Vec<String>,
    /// Source file extension, without the dot.
    pub extension: &'static str,
    pub compile: Option<CompileStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileStep {
    pub program: String,
    pub args: Vec<String>,
}

/// Values substituted into argument templates for one run.
#[derive(Debug, Clone, Copy)]
pub struct ArgContext<'a> {
    pub file: &'a Path,
    pub dir: &'a Path,
    pub class: &'a str,
}

/// Expand `{file}`, `{dir}` and `{class}` in an argument template.
pub fn render_args(template: &[String], ctx: &ArgContext<'_>) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace(FILE_PLACEHOLDER, &ctx.file.to_string_lossy())
                .replace(DIR_PLACEHOLDER, &ctx.dir.to_string_lossy())
                .replace(CLASS_PLACEHOLDER, ctx.class)
        })
        .collect()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl ToolchainSpec {
    pub fn python(program: &str) -> Self {
        Self {
            language: Language::Python,
            program: program.to_string(),
            // unbuffered, so output written before a timeout kill is not lost
            args: strings(&["-u", FILE_PLACEHOLDER]),
            extension: Language::Python.info().extension,
            compile: None,
        }
    }

    pub fn javascript(program: &str) -> Self {
        Self {
            language: Language::JavaScript,
            program: program.to_string(),
            args: strings(&[FILE_PLACEHOLDER]),
            extension: Language::JavaScript.info().extension,
            compile: None,
        }
    }

    pub fn java(javac: &str, java: &str) -> Self {
        let mut args = strings(&JAVA_UTF8_PROPERTIES);
        args.extend(strings(&["-cp", DIR_PLACEHOLDER, CLASS_PLACEHOLDER]));

        Self {
            language: Language::Java,
            program: java.to_string(),
            args,
            extension: Language::Java.info().extension,
            compile: Some(CompileStep {
                program: javac.to_string(),
                args: strings(&["-encoding", "UTF-8", "-d", DIR_PLACEHOLDER, FILE_PLACEHOLDER]),
            }),
        }
    }

    /// Every program this toolchain needs, compile step first.
    pub fn programs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(step) = &self.compile {
            out.push(step.program.as_str());
        }
        out.push(self.program.as_str());
        out
    }
}

/// Immutable language → toolchain mapping.
#[derive(Debug, Clone)]
pub struct Toolchains {
    specs: HashMap<Language, ToolchainSpec>,
}

impl Toolchains {
    pub fn from_runtime(runtime: &Runtime) -> Self {
        let specs = [
            ToolchainSpec::python(&runtime.python),
            ToolchainSpec::javascript(&runtime.node),
            ToolchainSpec::java(&runtime.javac, &runtime.java),
        ]
        .into_iter()
        .map(|spec| (spec.language, spec))
        .collect();

        Self { specs }
    }

    pub fn get(&self, language: Language) -> Option<&ToolchainSpec> {
        self.specs.get(&language)
    }

    /// Specs in the canonical language order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolchainSpec> {
        Language::ALL.into_iter().filter_map(|lang| self.specs.get(&lang))
    }
}

impl Default for Toolchains {
    fn default() -> Self {
        Self::from_runtime(&Runtime::default())
    }
}

/* ---------------- availability checks ---------------- */

#[derive(Debug, Clone, Serialize)]
pub struct ProgramStatus {
    pub program: String,
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolchainStatus {
    pub language: Language,
    pub available: bool,
    pub programs: Vec<ProgramStatus>,
}

/// Probe every program of a toolchain with `--version`.
pub async fn check_toolchain(spec: &ToolchainSpec) -> ToolchainStatus {
    let mut programs = Vec::new();
    for program in spec.programs() {
        programs.push(probe_program(program, spec.language).await);
    }

    ToolchainStatus {
        language: spec.language,
        available: programs.iter().all(|p| p.available),
        programs,
    }
}

pub async fn check_all(toolchains: &Toolchains) -> Vec<ToolchainStatus> {
    let mut out = Vec::new();
    for spec in toolchains.iter() {
        out.push(check_toolchain(spec).await);
    }
    out
}

pub(crate) async fn probe_program(program: &str, language: Language) -> ProgramStatus {
    let mut cmd = Command::new(program);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    apply_utf8_env(&mut cmd, language);

    let status = |available: bool, version: Option<String>, error: Option<String>| ProgramStatus {
        program: program.to_string(),
        available,
        version,
        error,
    };

    let output = match tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return status(false, None, Some(e.to_string())),
        Err(_) => return status(false, None, Some("version probe timed out".to_string())),
    };

    // some JDKs print the banner on stderr
    let stdout = decode_output(&output.stdout);
    let stderr = decode_output(&output.stderr);
    let version = first_line(&stdout).or_else(|| first_line(&stderr));

    if output.status.success() {
        status(true, version, None)
    } else {
        status(
            false,
            version,
            Some(format!("`{} --version` exited with {}", program, output.status)),
        )
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
