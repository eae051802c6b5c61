//! Assertion layer
//!
//! Assertions never touch the page. Each one blocks up to the wait budget
//! and fails with the locator description and the last observed state.

use tracing::info;

use crate::actions::{live_value, settle, single};
use crate::errors::Result;
use crate::locator::{Locator, TextMatch};
use crate::page::PageSession;
use crate::wait::{Observation, Probe, await_condition};

impl PageSession {
    /// Exactly one match, and it is visible
    pub async fn assert_visible(&self, locator: &Locator) -> Result<()> {
        info!("Assert {} is visible", locator);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                Ok(match single(&dom, locator) {
                    Ok(handle) if dom.node(handle.node()).is_some_and(|n| n.visible) => {
                        Probe::Ready(())
                    }
                    Ok(_) => Probe::Pending(Observation::Hidden),
                    Err(observation) => Probe::Pending(observation),
                })
            },
            &self.config().wait,
        )
        .await;
        settle(outcome, &locator.to_string(), "be visible", None)
    }

    /// No match is visible; zero matches also pass
    pub async fn assert_hidden(&self, locator: &Locator) -> Result<()> {
        info!("Assert {} is hidden", locator);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                let visible = locator
                    .resolve(&dom, None)
                    .iter()
                    .any(|h| dom.node(h.node()).is_some_and(|n| n.visible));
                Ok(if visible {
                    Probe::Pending(Observation::StillVisible)
                } else {
                    Probe::Ready(())
                })
            },
            &self.config().wait,
        )
        .await;
        settle(outcome, &locator.to_string(), "be hidden", None)
    }

    /// Text content of the single match satisfies `expected`
    pub async fn assert_text(&self, locator: &Locator, expected: &TextMatch) -> Result<()> {
        info!("Assert {} has text {}", locator, expected);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                Ok(match single(&dom, locator) {
                    Ok(handle) => {
                        let actual = dom.text_content(handle.node());
                        if expected.matches(&actual) {
                            Probe::Ready(())
                        } else {
                            Probe::Pending(Observation::TextMismatch { actual })
                        }
                    }
                    Err(observation) => Probe::Pending(observation),
                })
            },
            &self.config().wait,
        )
        .await;
        settle(
            outcome,
            &locator.to_string(),
            &format!("have text {}", expected),
            None,
        )
    }

    /// Attribute `name` is present and, when `expected` is given, matches it
    pub async fn assert_attribute(
        &self,
        locator: &Locator,
        name: &str,
        expected: Option<&TextMatch>,
    ) -> Result<()> {
        info!("Assert {} has attribute {}", locator, name);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                Ok(match single(&dom, locator) {
                    Ok(handle) => {
                        let actual = dom.node(handle.node()).and_then(|n| n.attr(name));
                        match (actual, expected) {
                            (Some(_), None) => Probe::Ready(()),
                            (Some(value), Some(expected)) if expected.matches(value) => {
                                Probe::Ready(())
                            }
                            (actual, _) => Probe::Pending(Observation::AttributeMismatch {
                                name: name.to_string(),
                                actual: actual.map(str::to_string),
                            }),
                        }
                    }
                    Err(observation) => Probe::Pending(observation),
                })
            },
            &self.config().wait,
        )
        .await;
        let condition = match expected {
            Some(expected) => format!("have attribute {}={}", name, expected),
            None => format!("have attribute {}", name),
        };
        settle(outcome, &locator.to_string(), &condition, None)
    }

    /// Live value of the single matching form control is exactly `expected`
    pub async fn assert_value(&self, locator: &Locator, expected: &str) -> Result<()> {
        info!("Assert {} has value {:?}", locator, expected);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                Ok(match single(&dom, locator) {
                    Ok(handle) => match live_value(&dom, handle) {
                        Some(actual) if actual == expected => Probe::Ready(()),
                        actual => Probe::Pending(Observation::ValueMismatch {
                            actual: actual.map(str::to_string),
                        }),
                    },
                    Err(observation) => Probe::Pending(observation),
                })
            },
            &self.config().wait,
        )
        .await;
        settle(
            outcome,
            &locator.to_string(),
            &format!("have value {:?}", expected),
            None,
        )
    }
}
