//! # Run Outcomes
//!
//! The typed result of every monitored run. Exactly one [`RunOutcome`] is
//! produced per run no matter how it ends: success, empty success,
//! exhausted retries, rejection at admission, or timeout. Downstream
//! consumers (run log, health scorer, failure correlator, canaries) all
//! read this one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::RunStatus;
use crate::error::{ErrorClass, VigilError};

/// What a fetch operation reports when it completes without error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Records retrieved by this run; zero is legitimate
    pub record_count: u64,
}

impl FetchReport {
    pub fn records(record_count: u64) -> Self {
        Self { record_count }
    }

    pub fn empty() -> Self {
        Self { record_count: 0 }
    }
}

/// One error observed during a run, positioned by attempt number.
///
/// A run that eventually succeeds still carries descriptors for the
/// attempts that failed along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub class: ErrorClass,
    pub message: String,
    /// 1-indexed attempt the error occurred on; 0 for pre-execution
    /// rejections where no attempt ran
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

impl ErrorDescriptor {
    /// Build a descriptor from an error raised on the given attempt
    pub fn from_error(attempt: u32, error: &VigilError) -> Self {
        Self {
            class: error.class(),
            message: error.to_string(),
            attempt,
            at: Utc::now(),
        }
    }
}

/// The complete record of one monitored run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub record_count: u64,
    /// Operation invocations actually made; zero when the run was
    /// rejected before any call went out
    pub attempts: u32,
    pub errors: Vec<ErrorDescriptor>,
}

impl RunOutcome {
    /// Wall-clock span of the run
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.signed_duration_since(self.started_at)
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// The error that decided the run's fate: the last one recorded
    pub fn primary_error(&self) -> Option<&ErrorDescriptor> {
        self.errors.last()
    }

    /// Whether any recorded error carries the given class
    pub fn has_error_class(&self, class: ErrorClass) -> bool {
        self.errors.iter().any(|e| e.class == class)
    }
}
