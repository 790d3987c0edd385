// src/report.rs

//! Session report export.
//!
//! A report is a self-contained JSON document describing one learner
//! session: the problem, the code as submitted, simple statistics and the
//! most recent execution and analysis results. It is meant to be downloaded or attached to
//! a ticket, so it is pretty-printed and keeps non-ASCII text as-is.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::analysis::AnalysisResult;
use crate::checks::{code_statistics, truncate_text};
use crate::language::Language;
use crate::runner::ExecutionResult;

pub const TOOL_NAME: &str = "AI Coding Mentor";
pub const REPORT_VERSION: &str = "2.0";

/// Preview length for assistant replies embedded in a report.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportInput {
    #[serde(default)]
    pub problem_statement: String,
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub execution: Option<ExecutionResult>,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub assistance: Vec<AssistanceEntry>,
}

/// One assistant reply the learner received during the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistanceEntry {
    pub kind: String,
    #[serde(default)]
    pub timestamp: String,
    pub content: String,
}

pub fn code_fingerprint(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Build the report document.
pub fn build_report(input: &ReportInput) -> Value {
    json!({
        "report_metadata": {
            "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "tool": TOOL_NAME,
            "version": REPORT_VERSION,
        },
        "session_data": {
            "problem_statement": input.problem_statement,
            "programming_language": input.language,
            "code_length": input.code.chars().count(),
            "code_sha256": code_fingerprint(&input.code),
        },
        "code_statistics": code_statistics(&input.code, input.language),
        "execution": format_execution(input.execution.as_ref()),
        "code_analysis": format_analysis(input.analysis.as_ref()),
        "ai_assistance": format_assistance(&input.assistance),
        "code_snapshot": input.code,
    })
}

/// Render the report as pretty JSON.
pub fn export_report(input: &ReportInput) -> Result<String> {
    serde_json::to_string_pretty(&build_report(input)).context("Failed to serialise report")
}

fn format_execution(result: Option<&ExecutionResult>) -> Value {
    let Some(r) = result else {
        return json!({ "status": "No execution performed" });
    };

    let status = if r.timed_out {
        "timed_out"
    } else if r.succeeded {
        "succeeded"
    } else {
        "failed"
    };

    json!({
        "status": status,
        "stage": r.stage,
        "exit_code": r.exit_code,
        "duration_ms": r.duration_ms,
        "stdout": r.stdout,
        "stderr": r.stderr,
    })
}

fn format_analysis(analysis: Option<&AnalysisResult>) -> Value {
    let Some(a) = analysis else {
        return json!({ "status": "No analysis performed" });
    };

    json!({
        "linting": {
            "issues_found": a.lint_issues.len(),
            "issues": a.lint_issues,
        },
        "formatting": {
            "needs_formatting": a.formatting_needed,
            "formatted_code_available": a.formatting_needed,
        },
        "complexity": a.complexity,
    })
}

fn format_assistance(entries: &[AssistanceEntry]) -> Value {
    if entries.is_empty() {
        return json!({ "status": "No AI assistance requested" });
    }

    let interactions: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "type": e.kind,
                "timestamp": e.timestamp,
                "content_preview": truncate_text(&e.content, PREVIEW_CHARS),
                "full_content": e.content,
            })
        })
        .collect();

    json!({
        "total_interactions": interactions.len(),
        "interactions": interactions,
    })
}
