//! # viewcheck
#![allow(clippy::uninlined_format_args)]
//!
//! Browser-driven UI verification for single-page admin applications.
//!
//! A scenario is a list of steps (navigate, click, fill, assert, capture)
//! run against one fresh browser session. Elements are found the way a
//! user would find them, by role and accessible name, placeholder or text,
//! and every step waits up to a bounded budget for the page to settle.
//!
//! ## CLI Usage
//!
//! ```bash
//! # List the built-in scenarios
//! viewcheck list
//!
//! # Run one against a local dev server
//! viewcheck run mute-dialog --base-url http://localhost:3000/
//!
//! # Run a scenario file, one screenshot per run in ./artifacts
//! viewcheck run @checks/mute.json --artifact-dir artifacts --format simple
//!
//! # See what a locator matches right now
//! viewcheck resolve "#/player/1" --role button --name Mute
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use viewcheck::{BrowserOptions, Locator, Scenario, ScenarioDriver, SessionConfig, WebDriverLauncher};
//!
//! # async fn example() -> viewcheck::Result<()> {
//! let scenario = Scenario::new("open-mute")
//!     .navigate("#/player/1")
//!     .click(Locator::role_named("tab", "Actions"))
//!     .assert_visible(Locator::role_named("button", "Mute"));
//!
//! let launcher = Arc::new(WebDriverLauncher::new(BrowserOptions::default()));
//! let driver = ScenarioDriver::new(launcher, SessionConfig::new("http://localhost:3000/")?);
//! let result = driver.run(&scenario, Path::new("open-mute.png")).await;
//! assert!(result.passed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Exit Codes
//!
//! - 0: Success
//! - 1: General error
//! - 2: Element not found
//! - 3: Multiple elements found
//! - 4: WebDriver failed
//! - 5: Timed out
//! - 6: Action failed
//! - 7: Invalid locator or scenario

pub mod actions;
pub mod aria;
pub mod assertions;
pub mod config;
pub mod dom;
pub mod errors;
pub mod locator;
pub mod page;
pub mod scenario;
pub mod scenarios;
pub mod selector;
pub mod types;
pub mod wait;
pub mod webdriver;
pub mod webdriver_manager;

pub use config::{BrowserOptions, SessionConfig};
pub use dom::{DomSnapshot, ElementBuilder};
pub use errors::{HarnessError, Result};
pub use locator::{ElementHandle, Locator, TextMatch};
pub use page::{ActionError, ElementSummary, Launcher, PageBackend, PageSession};
pub use scenario::{Scenario, ScenarioDriver, ScenarioResult, Step, StepStatus};
pub use wait::{Observation, Probe, WaitOptions, WaitOutcome, await_condition};
pub use webdriver::WebDriverLauncher;
