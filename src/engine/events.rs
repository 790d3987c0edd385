use crate::run_id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunCreated,
    CompileStarted,
    CompileFinished,
    ExecutionStarted,
    ExecutionFinished,
    TimedOut,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunEvent {
    pub run_id: RunId,
    pub kind: RunEventKind,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn now(run_id: &RunId, kind: RunEventKind) -> Self {
        Self {
            run_id: run_id.clone(),
            kind,
            timestamp: Utc::now(),
        }
    }
}
