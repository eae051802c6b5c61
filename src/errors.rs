use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::wait::Observation;

/// Result alias used across the harness
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Failure taxonomy for verification runs. Each variant maps to an exit code.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Locator matched zero elements after the wait deadline (exit code 2)
    #[error("no element matching {locator} after waiting {}ms", waited.as_millis())]
    NotFound { locator: String, waited: Duration },

    /// Locator matched more than one element where exactly one was required (exit code 3)
    #[error("expected exactly one element matching {locator}, but found {count}")]
    AmbiguousMatch { locator: String, count: usize },

    /// WebDriver connection or driver process failure (exit code 4)
    #[error("WebDriver connection failed: {0}")]
    WebDriverFailed(String),

    /// A predicate never became true within budget (exit code 5)
    #[error(
        "timed out after {}ms waiting for {locator} to {condition}; last observed: {observed}",
        waited.as_millis()
    )]
    TimedOut {
        locator: String,
        condition: String,
        observed: Observation,
        waited: Duration,
    },

    /// Action could not be performed on a resolved element (exit code 6)
    #[error("could not {action} {locator}: {reason}")]
    ActionFailed {
        locator: String,
        action: String,
        reason: String,
    },

    /// Malformed locator, e.g. an unparsable CSS path (exit code 7)
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// Malformed scenario definition (exit code 7)
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// The page session was already torn down
    #[error("page session is closed")]
    SessionClosed,

    /// Artifact could not be written
    #[error("failed to write artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic error (exit code 1)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::NotFound { .. } => 2,
            HarnessError::AmbiguousMatch { .. } => 3,
            HarnessError::WebDriverFailed(_) => 4,
            HarnessError::TimedOut { .. } => 5,
            HarnessError::ActionFailed { .. } => 6,
            HarnessError::InvalidLocator(_) | HarnessError::InvalidScenario(_) => 7,
            HarnessError::SessionClosed
            | HarnessError::Artifact { .. }
            | HarnessError::Other(_) => 1,
        }
    }

    /// Short machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::NotFound { .. } => "not_found",
            HarnessError::AmbiguousMatch { .. } => "ambiguous_match",
            HarnessError::WebDriverFailed(_) => "webdriver_failed",
            HarnessError::TimedOut { .. } => "timed_out",
            HarnessError::ActionFailed { .. } => "action_failed",
            HarnessError::InvalidLocator(_) => "invalid_locator",
            HarnessError::InvalidScenario(_) => "invalid_scenario",
            HarnessError::SessionClosed => "session_closed",
            HarnessError::Artifact { .. } => "artifact",
            HarnessError::Other(_) => "other",
        }
    }

    /// Locator description attached to this failure, if any
    pub fn locator(&self) -> Option<&str> {
        match self {
            HarnessError::NotFound { locator, .. }
            | HarnessError::AmbiguousMatch { locator, .. }
            | HarnessError::TimedOut { locator, .. }
            | HarnessError::ActionFailed { locator, .. } => Some(locator),
            _ => None,
        }
    }

    /// Last observed DOM state attached to this failure, if any
    pub fn observed(&self) -> Option<String> {
        match self {
            HarnessError::NotFound { .. } => Some(Observation::Absent.to_string()),
            HarnessError::AmbiguousMatch { count, .. } => {
                Some(Observation::Ambiguous { count: *count }.to_string())
            }
            HarnessError::TimedOut { observed, .. } => Some(observed.to_string()),
            HarnessError::ActionFailed { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    /// Classify a timed-out wait by what was last observed.
    ///
    /// `action` is set when the wait guarded a user action, so that a
    /// disabled or rejected target surfaces as `ActionFailed`.
    pub fn from_timeout(
        locator: &str,
        condition: &str,
        action: Option<&str>,
        observed: Observation,
        waited: Duration,
    ) -> Self {
        match (observed, action) {
            (Observation::Absent, _) => HarnessError::NotFound {
                locator: locator.to_string(),
                waited,
            },
            (Observation::Ambiguous { count }, _) => HarnessError::AmbiguousMatch {
                locator: locator.to_string(),
                count,
            },
            (observed @ (Observation::Disabled | Observation::Rejected(_)), Some(action)) => {
                HarnessError::ActionFailed {
                    locator: locator.to_string(),
                    action: action.to_string(),
                    reason: observed.to_string(),
                }
            }
            (observed, _) => HarnessError::TimedOut {
                locator: locator.to_string(),
                condition: condition.to_string(),
                observed,
                waited,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found = HarnessError::NotFound {
            locator: "css=#x".into(),
            waited: Duration::from_secs(5),
        };
        assert_eq!(not_found.exit_code(), 2);
        assert_eq!(not_found.kind(), "not_found");

        let ambiguous = HarnessError::AmbiguousMatch {
            locator: "role=button".into(),
            count: 2,
        };
        assert_eq!(ambiguous.exit_code(), 3);
        assert_eq!(
            ambiguous.to_string(),
            "expected exactly one element matching role=button, but found 2"
        );

        assert_eq!(HarnessError::WebDriverFailed("down".into()).exit_code(), 4);
        assert_eq!(HarnessError::InvalidLocator("[".into()).exit_code(), 7);
        assert_eq!(HarnessError::SessionClosed.exit_code(), 1);
    }

    #[test]
    fn test_from_timeout_classification() {
        let waited = Duration::from_millis(500);

        let err = HarnessError::from_timeout("css=a", "be visible", None, Observation::Absent, waited);
        assert!(matches!(err, HarnessError::NotFound { .. }));

        let err = HarnessError::from_timeout(
            "css=a",
            "be visible",
            None,
            Observation::Ambiguous { count: 3 },
            waited,
        );
        assert!(matches!(err, HarnessError::AmbiguousMatch { count: 3, .. }));

        let err = HarnessError::from_timeout(
            "css=a",
            "be clickable",
            Some("click"),
            Observation::Disabled,
            waited,
        );
        assert!(matches!(err, HarnessError::ActionFailed { .. }));
        assert_eq!(err.exit_code(), 6);

        // Without an action a disabled element is just an unmet predicate
        let err = HarnessError::from_timeout("css=a", "be visible", None, Observation::Hidden, waited);
        assert!(matches!(err, HarnessError::TimedOut { .. }));
        assert!(err.to_string().contains("present but not visible"));
        assert_eq!(err.observed().as_deref(), Some("element present but not visible"));
    }
}
