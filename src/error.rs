//! # Vigil Error Types
//!
//! Structured error handling for the resilience runtime using thiserror
//! for typed error variants instead of `Box<dyn Error>` patterns.
//!
//! Every error carries an [`ErrorClass`], the classification the retry
//! executor and circuit breakers key their decisions on. Classification is
//! assigned where the error is raised, closest to the failure, so callers
//! never re-guess retryability from message strings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure classification driving retry and breaker decisions.
///
/// The class answers one question: is retrying this error likely to help?
/// Transient faults, timeouts, and rate-limit denials are worth retrying.
/// Permanent faults and open breakers are not. Configuration errors abort
/// the run outright, and internal faults are surfaced, never swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Temporary dependency fault (connection reset, 5xx response).
    Transient,
    /// The operation exceeded its deadline.
    Timeout,
    /// Denied by a rate limiter, locally or by the remote dependency.
    RateLimited,
    /// The dependency rejected the request and will keep rejecting it.
    Permanent,
    /// Short-circuited by an open circuit breaker; no call was made.
    BreakerOpen,
    /// The runtime's own wiring is invalid; fail closed.
    Configuration,
    /// A defect inside the runtime itself.
    InternalFault,
}

impl ErrorClass {
    /// Whether another attempt at the same operation is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::Transient | ErrorClass::Timeout | ErrorClass::RateLimited
        )
    }

    /// Whether this class represents an executed call that failed, as
    /// opposed to a run that was never admitted. Only executed failures
    /// feed the failure correlator.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ErrorClass::Transient
                | ErrorClass::Timeout
                | ErrorClass::Permanent
                | ErrorClass::InternalFault
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Permanent => "permanent",
            ErrorClass::BreakerOpen => "breaker_open",
            ErrorClass::Configuration => "configuration",
            ErrorClass::InternalFault => "internal_fault",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for all vigil-core operations
///
/// `Display` and `std::error::Error` are implemented by hand rather than
/// via `#[derive(thiserror::Error)]`: thiserror unconditionally treats a
/// field named `source` as the underlying error cause, but here `source`
/// is the polled dependency's name, not a nested error.
#[derive(Debug, Clone)]
pub enum VigilError {
    Transient { source: String, message: String },

    Timeout { source: String, timeout: Duration },

    RateLimited { source: String, message: String },

    Permanent { source: String, message: String },

    BreakerOpen { source: String, reason: String },

    Configuration { component: String, message: String },

    InternalFault { message: String },
}

impl std::fmt::Display for VigilError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VigilError::Transient { source, message } => {
                write!(f, "Transient failure for {source}: {message}")
            }
            VigilError::Timeout { source, timeout } => {
                write!(f, "Operation for {source} timed out after {timeout:?}")
            }
            VigilError::RateLimited { source, message } => {
                write!(f, "Rate limited for {source}: {message}")
            }
            VigilError::Permanent { source, message } => {
                write!(f, "Permanent failure for {source}: {message}")
            }
            VigilError::BreakerOpen { source, reason } => {
                write!(f, "Circuit breaker is open for {source}: {reason}")
            }
            VigilError::Configuration { component, message } => {
                write!(f, "Configuration error: {component}: {message}")
            }
            VigilError::InternalFault { message } => {
                write!(f, "Internal fault: {message}")
            }
        }
    }
}

impl std::error::Error for VigilError {}

impl VigilError {
    /// Create a transient failure error
    pub fn transient(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(source: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            source: source.into(),
            timeout,
        }
    }

    /// Create a rate-limited error
    pub fn rate_limited(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Create a permanent failure error
    pub fn permanent(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Create a breaker-open rejection error
    pub fn breaker_open(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BreakerOpen {
            source: source.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an internal fault error
    pub fn internal_fault(message: impl Into<String>) -> Self {
        Self::InternalFault {
            message: message.into(),
        }
    }

    /// Classify an HTTP response status from a dependency.
    ///
    /// 429 is a rate-limit denial, any 5xx is transient, and every other
    /// 4xx is permanent. Statuses below 400 are not errors and map to an
    /// internal fault since callers should never classify them.
    pub fn from_http_status(
        source: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let message = message.into();
        match status {
            429 => Self::RateLimited {
                source,
                message: format!("HTTP 429: {message}"),
            },
            500..=599 => Self::Transient {
                source,
                message: format!("HTTP {status}: {message}"),
            },
            400..=499 => Self::Permanent {
                source,
                message: format!("HTTP {status}: {message}"),
            },
            _ => Self::InternalFault {
                message: format!("classified non-error HTTP status {status} for {source}: {message}"),
            },
        }
    }

    /// The classification assigned to this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            VigilError::Transient { .. } => ErrorClass::Transient,
            VigilError::Timeout { .. } => ErrorClass::Timeout,
            VigilError::RateLimited { .. } => ErrorClass::RateLimited,
            VigilError::Permanent { .. } => ErrorClass::Permanent,
            VigilError::BreakerOpen { .. } => ErrorClass::BreakerOpen,
            VigilError::Configuration { .. } => ErrorClass::Configuration,
            VigilError::InternalFault { .. } => ErrorClass::InternalFault,
        }
    }

    /// Whether the retry executor should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// The dependency this error is attributed to, when there is one.
    /// Configuration and internal faults belong to the runtime, not a
    /// dependency.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            VigilError::Transient { source, .. }
            | VigilError::Timeout { source, .. }
            | VigilError::RateLimited { source, .. }
            | VigilError::Permanent { source, .. }
            | VigilError::BreakerOpen { source, .. } => Some(source),
            VigilError::Configuration { .. } | VigilError::InternalFault { .. } => None,
        }
    }
}

/// Conversion from serde_json::Error for snapshot persistence paths
impl From<serde_json::Error> for VigilError {
    fn from(err: serde_json::Error) -> Self {
        VigilError::internal_fault(format!("JSON serialization: {err}"))
    }
}

/// Conversion from std::io::Error for file-backed state stores
impl From<std::io::Error> for VigilError {
    fn from(err: std::io::Error) -> Self {
        VigilError::internal_fault(format!("I/O: {err}"))
    }
}

/// Result type alias for vigil-core operations
pub type Result<T, E = VigilError> = std::result::Result<T, E>;
