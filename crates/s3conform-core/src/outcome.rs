//! Scenario outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quirks::Quirk;

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The service returned something other than the expected value
    Mismatch {
        /// Operation or assertion that was checked
        operation: String,
        /// Expected value, rendered
        expected: String,
        /// Observed value, rendered
        observed: String,
    },
    /// The service answered with a status the scenario did not expect
    UnexpectedStatus {
        /// Operation that was invoked
        operation: String,
        /// Protocol status code
        status: u16,
        /// Error message or code returned by the service
        message: String,
    },
    /// The storage collaborator failed below the protocol level
    Storage {
        /// Collaborator error, verbatim
        message: String,
    },
    /// A response header did not parse
    MalformedHeader {
        /// Operation that returned the header
        operation: String,
        /// Raw header value
        header: String,
    },
    /// The scenario resolved a quirk it did not declare
    QuirkGap {
        /// The undeclared quirk
        quirk: Quirk,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Mismatch {
                operation,
                expected,
                observed,
            } => write!(f, "{}: expected {} but got {}", operation, expected, observed),
            FailureReason::UnexpectedStatus {
                operation,
                status,
                message,
            } => write!(f, "{}: unexpected status {} ({})", operation, status, message),
            FailureReason::Storage { message } => write!(f, "storage error: {}", message),
            FailureReason::MalformedHeader { operation, header } => {
                write!(f, "{}: malformed header {:?}", operation, header)
            }
            FailureReason::QuirkGap { quirk } => {
                write!(f, "scenario resolved undeclared quirk {}", quirk)
            }
        }
    }
}

/// Result of running one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ConformanceOutcome {
    /// Every assertion held
    Passed,
    /// An assertion failed
    Failed(FailureReason),
    /// Not run because the service declares this quirk
    Skipped(Quirk),
}

impl ConformanceOutcome {
    /// True for [`ConformanceOutcome::Passed`].
    pub fn is_passed(&self) -> bool {
        matches!(self, ConformanceOutcome::Passed)
    }

    /// True for [`ConformanceOutcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, ConformanceOutcome::Failed(_))
    }

    /// True for [`ConformanceOutcome::Skipped`].
    pub fn is_skipped(&self) -> bool {
        matches!(self, ConformanceOutcome::Skipped(_))
    }

    /// Short status marker for console output.
    pub fn marker(&self) -> &'static str {
        match self {
            ConformanceOutcome::Passed => "✅",
            ConformanceOutcome::Failed(_) => "❌",
            ConformanceOutcome::Skipped(_) => "🙈",
        }
    }
}

impl fmt::Display for ConformanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConformanceOutcome::Passed => f.write_str("passed"),
            ConformanceOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            ConformanceOutcome::Skipped(quirk) => write!(f, "skipped: {}", quirk),
        }
    }
}
