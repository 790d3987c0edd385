// src/analysis.rs

//! Static analysis of Python submissions.
//!
//! Three external tools are driven as subprocesses, each under its own
//! deadline: `flake8` for lint issues, `black` for formatting and `radon`
//! for complexity metrics. None of them is required. A missing or failing
//! tool degrades its own section of the result:
//!
//! - lint reports a single `MISSING`, `TIMEOUT` or `ERROR` issue
//! - formatting hands back the original code unchanged
//! - complexity falls back to a line-based estimate
//!
//! Only errors on our side (temp dir, writing the source) are returned as
//! `Err`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{AnalysisConfig, Config, MAX_TIMEOUT_SECS};
use crate::encoding::decode_output;
use crate::language::Language;
use crate::runner::{spawn_and_wait, Invocation, RunError};
use crate::toolchain::{probe_program, ProgramStatus};

const SOURCE_FILE: &str = "main.py";

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+\w+").expect("function pattern is valid")
});

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*class[ \t]+\w+").expect("class pattern is valid"));

static CONTROL_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:if|elif|for|while|try)\b").expect("control flow pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

impl LintIssue {
    fn tool_problem(code: &str, message: impl Into<String>) -> Self {
        Self {
            line: 0,
            column: 0,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Complexity metrics. Which fields are set depends on whether radon ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_complexity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainability_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_flow_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_complexity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    /// Why radon produced nothing usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Complexity {
    fn has_metrics(&self) -> bool {
        self.average_complexity.is_some()
            || self.maintainability_index.is_some()
            || self.function_count.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub lint_issues: Vec<LintIssue>,
    pub formatting_needed: bool,
    /// black's output, or the submitted code when black could not run.
    pub formatted_code: String,
    pub complexity: Complexity,
}

/// What one tool invocation came back with.
enum ToolOutput {
    Finished {
        success: bool,
        stdout: String,
        stderr: String,
    },
    Missing,
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    cfg: AnalysisConfig,
    temp_root: Option<PathBuf>,
}

impl Analyzer {
    pub fn new(cfg: AnalysisConfig) -> Self {
        Self {
            cfg,
            temp_root: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            cfg: cfg.analysis.clone(),
            temp_root: cfg.execution.temp_dir.clone(),
        }
    }

    #[tracing::instrument(skip(self, source), fields(len = source.len()))]
    pub async fn analyze(
        &self,
        language: Language,
        source: &str,
    ) -> Result<AnalysisResult, RunError> {
        if language != Language::Python {
            return Err(RunError::UnsupportedLanguage(format!(
                "{} (analysis is available for python only)",
                language
            )));
        }

        let workdir = match &self.temp_root {
            Some(root) => tempfile::Builder::new()
                .prefix("codementor-analysis-")
                .tempdir_in(root),
            None => tempfile::Builder::new()
                .prefix("codementor-analysis-")
                .tempdir(),
        }
        .map_err(|source| RunError::Io {
            context: "creating the analysis directory",
            source,
        })?;

        tokio::fs::write(workdir.path().join(SOURCE_FILE), source)
            .await
            .map_err(|source| RunError::Io {
                context: "writing the source file",
                source,
            })?;

        let lint_issues = self.lint(workdir.path()).await;
        let (formatted_code, formatting_needed) = self.format(workdir.path(), source).await;
        let complexity = self.complexity(workdir.path(), source).await;

        tracing::info!(
            issues = lint_issues.len(),
            formatting_needed,
            "analysis finished"
        );

        Ok(AnalysisResult {
            lint_issues,
            formatting_needed,
            formatted_code,
            complexity,
        })
    }

    /// `--version` check for each analysis tool.
    pub async fn check_dependencies(&self) -> Vec<ProgramStatus> {
        let mut out = Vec::new();
        for program in [&self.cfg.flake8, &self.cfg.black, &self.cfg.radon] {
            out.push(probe_program(program, Language::Python).await);
        }
        out
    }

    async fn lint(&self, dir: &Path) -> Vec<LintIssue> {
        let args = vec![
            "--format=%(row)d:%(col)d:%(code)s:%(text)s".to_string(),
            SOURCE_FILE.to_string(),
        ];

        match self.invoke(&self.cfg.flake8, args, dir, None).await {
            // flake8 exits 1 when it found issues
            ToolOutput::Finished { stdout, stderr, .. } => {
                let issues = parse_flake8(&stdout);
                if issues.is_empty() && !stderr.trim().is_empty() {
                    vec![LintIssue::tool_problem("ERROR", stderr.trim())]
                } else {
                    issues
                }
            }
            ToolOutput::Missing => vec![LintIssue::tool_problem(
                "MISSING",
                format!("{} is not installed (pip install flake8)", self.cfg.flake8),
            )],
            ToolOutput::TimedOut => vec![LintIssue::tool_problem(
                "TIMEOUT",
                format!("{} timed out", self.cfg.flake8),
            )],
            ToolOutput::Failed(reason) => vec![LintIssue::tool_problem("ERROR", reason)],
        }
    }

    async fn format(&self, dir: &Path, source: &str) -> (String, bool) {
        let args = vec!["--quiet".to_string(), "-".to_string()];
        match self.invoke(&self.cfg.black, args, dir, Some(source)).await {
            ToolOutput::Finished {
                success: true,
                stdout,
                ..
            } => {
                let needed = stdout != source;
                (stdout, needed)
            }
            ToolOutput::Finished { stderr, .. } => {
                tracing::debug!(stderr = %stderr.trim(), "black could not format the code");
                (source.to_string(), false)
            }
            _ => (source.to_string(), false),
        }
    }

    async fn complexity(&self, dir: &Path, source: &str) -> Complexity {
        let mut out = Complexity::default();

        let cc_args = vec!["cc".to_string(), "-j".to_string(), SOURCE_FILE.to_string()];
        match self.invoke(&self.cfg.radon, cc_args, dir, None).await {
            ToolOutput::Finished {
                success: true,
                stdout,
                ..
            } => match parse_radon_cc(&stdout) {
                Ok(cc) => {
                    out.average_complexity = cc.average_complexity;
                    out.max_complexity = cc.max_complexity;
                    out.function_count = cc.function_count;
                }
                Err(e) => out.error = Some(e),
            },
            other => out.error = Some(self.describe_failure(&self.cfg.radon, other)),
        }

        if out.error.is_none() {
            let mi_args = vec!["mi".to_string(), "-j".to_string(), SOURCE_FILE.to_string()];
            if let ToolOutput::Finished {
                success: true,
                stdout,
                ..
            } = self.invoke(&self.cfg.radon, mi_args, dir, None).await
            {
                out.maintainability_index = parse_radon_mi(&stdout);
            }
        }

        if out.error.is_some() || !out.has_metrics() {
            let error = out.error.take();
            out = basic_complexity(source);
            out.error = error;
        }
        out
    }

    fn describe_failure(&self, program: &str, output: ToolOutput) -> String {
        match output {
            ToolOutput::Missing => format!("{} is not installed", program),
            ToolOutput::TimedOut => format!("{} timed out", program),
            ToolOutput::Failed(reason) => reason,
            ToolOutput::Finished { stderr, .. } => {
                let detail = stderr.lines().next().unwrap_or("").trim();
                if detail.is_empty() {
                    format!("{} failed", program)
                } else {
                    format!("{} failed: {}", program, detail)
                }
            }
        }
    }

    async fn invoke(
        &self,
        program: &str,
        args: Vec<String>,
        cwd: &Path,
        stdin: Option<&str>,
    ) -> ToolOutput {
        let budget = self
            .cfg
            .timeout()
            .min(Duration::from_secs(MAX_TIMEOUT_SECS));
        let invocation = Invocation {
            language: Language::Python,
            program,
            args,
            cwd,
            stdin,
            deadline: Instant::now() + budget,
        };

        match spawn_and_wait(invocation).await {
            Ok(outcome) if outcome.timed_out => ToolOutput::TimedOut,
            Ok(outcome) => ToolOutput::Finished {
                success: outcome.succeeded(),
                stdout: decode_output(&outcome.stdout.bytes),
                stderr: decode_output(&outcome.stderr.bytes),
            },
            Err(RunError::ToolchainMissing { .. }) => ToolOutput::Missing,
            Err(e) => ToolOutput::Failed(e.to_string()),
        }
    }
}

/// Parse `row:col:code:text` lines. Anything else is skipped.
fn parse_flake8(stdout: &str) -> Vec<LintIssue> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, ':');
            let line_no = parts.next()?.trim().parse().ok()?;
            let column = parts.next()?.trim().parse().ok()?;
            let code = parts.next()?.trim().to_string();
            let message = parts.next()?.trim().to_string();
            Some(LintIssue {
                line: line_no,
                column,
                code,
                message,
            })
        })
        .collect()
}

/// `radon cc -j` prints `{file: [blocks]}`, or `{file: {"error": ..}}` when
/// the file does not parse.
fn parse_radon_cc(stdout: &str) -> Result<Complexity, String> {
    let doc: Value =
        serde_json::from_str(stdout).map_err(|e| format!("unreadable radon output: {}", e))?;
    let entry = doc
        .as_object()
        .and_then(|files| files.values().next())
        .ok_or_else(|| "radon reported no files".to_string())?;

    if let Some(error) = entry.get("error").and_then(Value::as_str) {
        return Err(error.to_string());
    }

    let scores: Vec<u32> = entry
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("complexity").and_then(Value::as_u64))
                .map(|c| c as u32)
                .collect()
        })
        .unwrap_or_default();

    if scores.is_empty() {
        return Ok(Complexity::default());
    }

    let total: u32 = scores.iter().sum();
    Ok(Complexity {
        average_complexity: Some(f64::from(total) / scores.len() as f64),
        max_complexity: scores.iter().copied().max(),
        function_count: Some(scores.len()),
        ..Complexity::default()
    })
}

/// `radon mi -j` prints `{file: {"mi": 71.2, "rank": "A"}}`.
fn parse_radon_mi(stdout: &str) -> Option<f64> {
    let doc: Value = serde_json::from_str(stdout).ok()?;
    doc.as_object()?.values().next()?.get("mi")?.as_f64()
}

/// Line-based estimate used when radon is unavailable.
fn basic_complexity(source: &str) -> Complexity {
    let functions = FUNCTION_RE.find_iter(source).count();
    let classes = CLASS_RE.find_iter(source).count();
    let control_flow = CONTROL_FLOW_RE.find_iter(source).count();

    Complexity {
        function_count: Some(functions),
        class_count: Some(classes),
        control_flow_count: Some(control_flow),
        estimated_complexity: Some(control_flow + functions),
        analysis_type: Some("basic".to_string()),
        ..Complexity::default()
    }
}
