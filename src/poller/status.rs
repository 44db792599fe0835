//! Job status vocabulary
//!
//! The status endpoint answers with one of:
//! `{status:"running", current, total, percent, message, stage}`,
//! `{status:"completed", result:{count}}`, `{status:"failed", error}`,
//! `{status:"not_found"}` or an empty body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::error::extract_message;
use crate::locale::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    Running,
    Completed,
    Failed,
    NotFound,
}

impl JobStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initializing" => Some(Self::Initializing),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::NotFound => 0,
            Self::Initializing => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    /// The status after observing `next`; never moves backwards
    pub fn advance(self, next: JobStatus) -> JobStatus {
        if next.rank() >= self.rank() { next } else { self }
    }
}

/// Visible progress of a running job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub current: u64,
    pub total: u64,
    pub percent: f64,
    pub message: Option<String>,
    /// Backend-defined display tag, e.g. `checking_regions`
    pub stage: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    pub fn initializing() -> Self {
        Self {
            status: JobStatus::Initializing,
            current: 0,
            total: 0,
            percent: 0.0,
            message: None,
            stage: None,
            updated_at: Utc::now(),
        }
    }

    /// Fold a newer report into this state, keeping the status monotonic
    pub fn merge(&self, next: JobProgress) -> JobProgress {
        JobProgress {
            status: self.status.advance(next.status),
            ..next
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { count: u64, result: Value },
    Failed { error: Option<String> },
}

impl JobOutcome {
    pub fn completed(count: u64) -> Self {
        Self::Completed {
            count,
            result: serde_json::json!({ "count": count }),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: Some(error.into()),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// User-facing summary for the notification area
    pub fn notification(&self, locale: Locale) -> String {
        match self {
            Self::Completed { count, .. } => locale.scan_completed(*count),
            Self::Failed { error } => locale.scan_failed(error.as_deref()),
        }
    }
}

/// One parsed answer from the status endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    /// Not registered yet (also: empty body or unknown status)
    NotFound,
    Progress(JobProgress),
    Terminal(JobOutcome),
}

impl StatusReport {
    pub fn from_value(value: &Value) -> Self {
        let Some(status) = value
            .get("status")
            .and_then(Value::as_str)
            .and_then(JobStatus::parse)
        else {
            return Self::NotFound;
        };

        match status {
            JobStatus::NotFound => Self::NotFound,
            JobStatus::Initializing | JobStatus::Running => Self::Progress(parse_progress(status, value)),
            JobStatus::Completed => {
                let result = value.get("result").cloned().unwrap_or(Value::Null);
                let count = result.get("count").and_then(as_count).unwrap_or(0);
                Self::Terminal(JobOutcome::Completed { count, result })
            }
            JobStatus::Failed => Self::Terminal(JobOutcome::Failed {
                error: extract_message(value),
            }),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::NotFound => JobStatus::NotFound,
            Self::Progress(progress) => progress.status,
            Self::Terminal(outcome) => outcome.status(),
        }
    }
}

fn parse_progress(status: JobStatus, value: &Value) -> JobProgress {
    let current = value.get("current").and_then(as_count).unwrap_or(0);
    let total = value.get("total").and_then(as_count).unwrap_or(0);

    let percent = value
        .get("percent")
        .and_then(Value::as_f64)
        .unwrap_or_else(|| {
            if total > 0 {
                current as f64 * 100.0 / total as f64
            } else {
                0.0
            }
        })
        .clamp(0.0, 100.0);

    JobProgress {
        status,
        current,
        total,
        percent,
        message: value.get("message").and_then(Value::as_str).map(str::to_string),
        stage: value.get("stage").and_then(Value::as_str).map(str::to_string),
        updated_at: Utc::now(),
    }
}

/// Counts sometimes arrive as floats (`5.0`)
fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}
