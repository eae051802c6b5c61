//! Wait/retry engine
//!
//! Every DOM-touching check goes through [`await_condition`]: the predicate
//! is polled until it reports [`Probe::Ready`] or the deadline passes. On
//! timeout the last [`Observation`] is returned so that failures say *what*
//! was seen, not just that time ran out.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::debug;

/// Default wait budget for every locate/assert/act call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default delay between two probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        // A zero interval would spin the runtime
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

/// Last observed state of a pending condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    Absent,
    Ambiguous { count: usize },
    Hidden,
    StillVisible,
    Disabled,
    TextMismatch { actual: String },
    AttributeMismatch { name: String, actual: Option<String> },
    ValueMismatch { actual: Option<String> },
    Rejected(String),
    Unavailable(String),
    /// The page still shows another route
    RouteMismatch { actual: String },
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Absent => write!(f, "element absent"),
            Observation::Ambiguous { count } => write!(f, "{} matching elements", count),
            Observation::Hidden => write!(f, "element present but not visible"),
            Observation::StillVisible => write!(f, "element still visible"),
            Observation::Disabled => write!(f, "element present but disabled"),
            Observation::TextMismatch { actual } => write!(f, "text was {:?}", actual),
            Observation::AttributeMismatch { name, actual: None } => {
                write!(f, "attribute {} absent", name)
            }
            Observation::AttributeMismatch {
                name,
                actual: Some(actual),
            } => write!(f, "attribute {} was {:?}", name, actual),
            Observation::ValueMismatch { actual: None } => write!(f, "element has no value"),
            Observation::ValueMismatch {
                actual: Some(actual),
            } => write!(f, "value was {:?}", actual),
            Observation::Rejected(reason) => write!(f, "action rejected: {}", reason),
            Observation::Unavailable(reason) => write!(f, "page unavailable: {}", reason),
            Observation::RouteMismatch { actual } => write!(f, "page still showed {}", actual),
        }
    }
}

/// Result of one predicate evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    Pending(Observation),
}

/// Result of a retried operation; never partially successful
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Resolved(T),
    TimedOut {
        last: Observation,
        waited: Duration,
        attempts: u32,
    },
}

impl<T> WaitOutcome<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, WaitOutcome::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            WaitOutcome::Resolved(value) => Some(value),
            WaitOutcome::TimedOut { .. } => None,
        }
    }
}

/// Poll `predicate` until it is ready or `options.timeout` has elapsed.
///
/// A predicate error is treated as a transient read failure and recorded
/// as [`Observation::Unavailable`]. Each evaluation is bounded so a hung
/// call cannot outlive the deadline by more than one poll interval.
pub async fn await_condition<T, F, Fut>(mut predicate: F, options: &WaitOptions) -> WaitOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Probe<T>>>,
{
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(options.poll_interval);

        let last = match time::timeout(budget, predicate()).await {
            Ok(Ok(Probe::Ready(value))) => return WaitOutcome::Resolved(value),
            Ok(Ok(Probe::Pending(observation))) => observation,
            Ok(Err(e)) => Observation::Unavailable(format!("{:#}", e)),
            Err(_) => Observation::Unavailable(format!(
                "no response within {}ms",
                budget.as_millis()
            )),
        };

        let now = Instant::now();
        if now >= deadline {
            let waited = now - started;
            debug!(
                "Condition not met after {} attempts in {}ms: {}",
                attempts,
                waited.as_millis(),
                last
            );
            return WaitOutcome::TimedOut {
                last,
                waited,
                attempts,
            };
        }
        time::sleep(options.poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
#[path = "wait_test.rs"]
mod wait_test;
