//! Scenario driver
//!
//! A scenario is a straight line of steps. The first failing step aborts
//! the rest; the failure state is captured into the run's artifact and the
//! page session is always closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::{HarnessError, Result};
use crate::locator::{Locator, TextMatch};
use crate::page::{Launcher, PageSession};

/// One scenario step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Navigate {
        to: String,
    },
    Click {
        target: Locator,
    },
    Fill {
        target: Locator,
        text: String,
    },
    AssertVisible {
        target: Locator,
    },
    AssertHidden {
        target: Locator,
    },
    AssertText {
        target: Locator,
        expected: TextMatch,
    },
    AssertAttribute {
        target: Locator,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<TextMatch>,
    },
    AssertValue {
        target: Locator,
        expected: String,
    },
    Capture,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Navigate { to } => write!(f, "navigate to {}", to),
            Step::Click { target } => write!(f, "click {}", target),
            Step::Fill { target, text } => write!(f, "fill {} with {:?}", target, text),
            Step::AssertVisible { target } => write!(f, "assert {} is visible", target),
            Step::AssertHidden { target } => write!(f, "assert {} is hidden", target),
            Step::AssertText { target, expected } => {
                write!(f, "assert {} has text {}", target, expected)
            }
            Step::AssertAttribute {
                target,
                name,
                expected: None,
            } => write!(f, "assert {} has attribute {}", target, name),
            Step::AssertAttribute {
                target,
                name,
                expected: Some(expected),
            } => write!(f, "assert {} has attribute {}={}", target, name, expected),
            Step::AssertValue { target, expected } => {
                write!(f, "assert {} has value {:?}", target, expected)
            }
            Step::Capture => write!(f, "capture screenshot"),
        }
    }
}

impl Step {
    /// Run the step; a capture step returns the artifact it wrote
    async fn execute(&self, session: &mut PageSession, artifact: &Path) -> Result<Option<PathBuf>> {
        match self {
            Step::Navigate { to } => session.navigate(to).await?,
            Step::Click { target } => session.click(target).await?,
            Step::Fill { target, text } => session.fill(target, text).await?,
            Step::AssertVisible { target } => session.assert_visible(target).await?,
            Step::AssertHidden { target } => session.assert_hidden(target).await?,
            Step::AssertText { target, expected } => session.assert_text(target, expected).await?,
            Step::AssertAttribute {
                target,
                name,
                expected,
            } => {
                session
                    .assert_attribute(target, name, expected.as_ref())
                    .await?
            }
            Step::AssertValue { target, expected } => session.assert_value(target, expected).await?,
            Step::Capture => return session.capture(artifact).await.map(Some),
        }
        Ok(None)
    }
}

/// Named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn navigate(self, to: impl Into<String>) -> Self {
        self.step(Step::Navigate { to: to.into() })
    }

    pub fn click(self, target: Locator) -> Self {
        self.step(Step::Click { target })
    }

    pub fn fill(self, target: Locator, text: impl Into<String>) -> Self {
        self.step(Step::Fill {
            target,
            text: text.into(),
        })
    }

    pub fn assert_visible(self, target: Locator) -> Self {
        self.step(Step::AssertVisible { target })
    }

    pub fn assert_hidden(self, target: Locator) -> Self {
        self.step(Step::AssertHidden { target })
    }

    pub fn assert_text(self, target: Locator, expected: impl Into<TextMatch>) -> Self {
        self.step(Step::AssertText {
            target,
            expected: expected.into(),
        })
    }

    pub fn assert_attribute(self, target: Locator, name: &str, expected: Option<TextMatch>) -> Self {
        self.step(Step::AssertAttribute {
            target,
            name: name.to_string(),
            expected,
        })
    }

    pub fn assert_value(self, target: Locator, expected: impl Into<String>) -> Self {
        self.step(Step::AssertValue {
            target,
            expected: expected.into(),
        })
    }

    pub fn capture(self) -> Self {
        self.step(Step::Capture)
    }

    /// Parse and validate a scenario definition
    pub fn from_json(raw: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_json::from_str(raw).map_err(|e| HarnessError::InvalidScenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::InvalidScenario(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::InvalidScenario(
                "scenario name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(HarnessError::InvalidScenario(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        Ok(())
    }

    /// Steps as run: a capture is appended when the scenario has none
    pub fn planned_steps(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        if !steps.iter().any(|s| matches!(s, Step::Capture)) {
            steps.push(Step::Capture);
        }
        steps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub label: String,
    pub status: StepStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    /// `None` when the session could not be opened
    pub step_index: Option<usize>,
    pub step: String,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub console_errors: Vec<String>,
}

impl FailureReport {
    fn new(step_index: Option<usize>, step: String, error: &HarnessError, console_errors: Vec<String>) -> Self {
        Self {
            step_index,
            step,
            kind: error.kind().to_string(),
            message: error.to_string(),
            locator: error.locator().map(str::to_string),
            observed: error.observed(),
            exit_code: error.exit_code(),
            console_errors,
        }
    }
}

/// Outcome of one run; immutable once produced
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    run_id: Uuid,
    scenario: String,
    passed: bool,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureReport>,
}

impl ScenarioResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        match &self.failure {
            None if self.passed => 0,
            None => 1,
            Some(failure) => failure.exit_code,
        }
    }
}

/// Runs scenarios, one fresh page session per run
#[derive(Clone)]
pub struct ScenarioDriver {
    launcher: Arc<dyn Launcher>,
    config: SessionConfig,
}

impl ScenarioDriver {
    pub fn new(launcher: Arc<dyn Launcher>, config: SessionConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run `scenario`, writing its screenshot to `artifact`
    pub async fn run(&self, scenario: &Scenario, artifact: &Path) -> ScenarioResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let steps = scenario.planned_steps();
        info!("Running scenario '{}' ({} steps, run {})", scenario.name, steps.len(), run_id);

        let finish = |records, artifact: Option<PathBuf>, failure: Option<FailureReport>| {
            let passed = failure.is_none() && artifact.is_some();
            ScenarioResult {
                run_id,
                scenario: scenario.name.clone(),
                passed,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
                steps: records,
                artifact,
                failure,
            }
        };

        let mut session = match PageSession::open(self.launcher.as_ref(), self.config.clone()).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open page session: {}", e);
                let records = skipped_records(&steps, 0);
                let failure = FailureReport::new(None, "open session".to_string(), &e, Vec::new());
                return finish(records, None, Some(failure));
            }
        };

        let mut records = Vec::with_capacity(steps.len());
        let mut written = None;
        let mut failure = None;

        for (index, step) in steps.iter().enumerate() {
            let label = step.to_string();
            info!("Step {}/{}: {}", index + 1, steps.len(), label);
            let step_clock = Instant::now();
            let outcome = step.execute(&mut session, artifact).await;
            let elapsed_ms = step_clock.elapsed().as_millis() as u64;

            match outcome {
                Ok(path) => {
                    if path.is_some() {
                        written = path;
                    }
                    records.push(StepRecord {
                        index,
                        label,
                        status: StepStatus::Passed,
                        elapsed_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Step {} failed: {}", index + 1, e);
                    let console_errors = session.console_errors().await;
                    records.push(StepRecord {
                        index,
                        label: label.clone(),
                        status: StepStatus::Failed,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    });
                    records.extend(skipped_records(&steps, index + 1));
                    failure = Some(FailureReport::new(Some(index), label, &e, console_errors));
                    break;
                }
            }
        }

        if failure.is_some() {
            match session.capture(artifact).await {
                Ok(path) => written = Some(path),
                Err(e) => warn!("Could not capture failure state: {}", e),
            }
        }
        if let Err(e) = session.close().await {
            warn!("Failed to close page session {}: {}", session.id(), e);
        }

        let result = finish(records, written, failure);
        info!(
            "Scenario '{}' {} in {}ms",
            result.scenario,
            if result.passed { "passed" } else { "failed" },
            result.duration_ms
        );
        result
    }
}

fn skipped_records(steps: &[Step], from: usize) -> Vec<StepRecord> {
    steps
        .iter()
        .enumerate()
        .skip(from)
        .map(|(index, step)| StepRecord {
            index,
            label: step.to_string(),
            status: StepStatus::Skipped,
            elapsed_ms: 0,
            error: None,
        })
        .collect()
}

#[cfg(test)]
#[path = "scenario_test.rs"]
mod scenario_test;
