//! Action executor
//!
//! `navigate`, `click` and `fill` each resolve their target through the
//! wait engine, perform the action, and return once the action's settle
//! condition holds. A click does not wait for anything it might open; the
//! next assertion step owns that.

use tracing::{debug, info};
use url::Url;

use crate::dom::{DomNode, DomSnapshot};
use crate::errors::{HarnessError, Result};
use crate::locator::{ElementHandle, Locator};
use crate::page::{ActionError, PageSession};
use crate::wait::{Observation, Probe, WaitOutcome, await_condition};

/// Input types that do not take typed text
const NON_TEXT_INPUTS: &[&str] = &[
    "button", "checkbox", "color", "file", "hidden", "image", "radio", "range", "reset", "submit",
];

impl PageSession {
    /// Load `target` (URL, path or `#/route`) and wait for the app's root marker
    pub async fn navigate(&mut self, target: &str) -> Result<()> {
        let url = self.resolve_url(target)?;
        info!("Navigating to {}", url);
        self.backend()?
            .navigate(&url)
            .await
            .map_err(|e| HarnessError::WebDriverFailed(format!("Failed to navigate to {}: {:#}", url, e)))?;
        self.route = Some(url.clone());

        let session = &*self;
        let marker = &session.config().root_marker;
        let expected = &url;
        let outcome = await_condition(
            move || async move {
                let dom = session.snapshot().await?;
                // Until the app re-renders, the marker may still belong to the previous route
                if Url::parse(dom.url()).ok().as_ref() != Some(expected) {
                    return Ok(Probe::Pending(Observation::RouteMismatch {
                        actual: dom.url().to_string(),
                    }));
                }
                let handles = marker.resolve(&dom, None);
                if handles.is_empty() {
                    return Ok(Probe::Pending(Observation::Absent));
                }
                let visible = handles
                    .iter()
                    .any(|h| dom.node(h.node()).is_some_and(|n| n.visible));
                Ok(if visible {
                    Probe::Ready(())
                } else {
                    Probe::Pending(Observation::Hidden)
                })
            },
            &session.config().wait,
        )
        .await;
        settle(
            outcome,
            &marker.to_string(),
            &format!("be visible after navigating to {}", url),
            None,
        )
    }

    /// Click the single element matching `locator`
    pub async fn click(&self, locator: &Locator) -> Result<()> {
        let description = locator.to_string();
        info!("Click {}", description);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                let handle = match actionable(&dom, locator, false) {
                    Ok(handle) => handle,
                    Err(observation) => return Ok(Probe::Pending(observation)),
                };
                match self.backend()?.click(handle).await {
                    Ok(()) => Ok(Probe::Ready(())),
                    Err(e) => rejected(e),
                }
            },
            &self.config().wait,
        )
        .await;
        settle(outcome, &description, "be clickable", Some("click"))
    }

    /// Replace the value of the single editable control matching `locator`.
    ///
    /// Settles once the control's live value is exactly `text`.
    pub async fn fill(&self, locator: &Locator, text: &str) -> Result<()> {
        let description = locator.to_string();
        info!("Fill {} with {:?}", description, text);
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                let handle = match actionable(&dom, locator, true) {
                    Ok(handle) => handle,
                    Err(observation) => return Ok(Probe::Pending(observation)),
                };
                if live_value(&dom, handle) == Some(text) {
                    return Ok(Probe::Ready(()));
                }
                if let Err(e) = self.backend()?.fill(handle, text).await {
                    return rejected(e);
                }

                // Re-read so truncation or reformatting by the app is caught
                let after = self.snapshot().await?;
                let actual = match actionable(&after, locator, true) {
                    Ok(handle) => live_value(&after, handle).map(str::to_string),
                    Err(observation) => return Ok(Probe::Pending(observation)),
                };
                if actual.as_deref() == Some(text) {
                    Ok(Probe::Ready(()))
                } else {
                    debug!("Value after fill is {:?}", actual);
                    Ok(Probe::Pending(Observation::ValueMismatch { actual }))
                }
            },
            &self.config().wait,
        )
        .await;
        settle(
            outcome,
            &description,
            &format!("hold the value {:?}", text),
            Some("fill"),
        )
    }
}

/// The single match of `locator`, or what was seen instead
pub(crate) fn single(dom: &DomSnapshot, locator: &Locator) -> std::result::Result<ElementHandle, Observation> {
    let handles = locator.resolve(dom, None);
    match handles.as_slice() {
        [] => Err(Observation::Absent),
        [handle] => Ok(*handle),
        many => Err(Observation::Ambiguous { count: many.len() }),
    }
}

/// Turn a finished wait into the step's result
pub(crate) fn settle<T>(
    outcome: WaitOutcome<T>,
    locator: &str,
    condition: &str,
    action: Option<&str>,
) -> Result<T> {
    match outcome {
        WaitOutcome::Resolved(value) => Ok(value),
        WaitOutcome::TimedOut {
            last,
            waited,
            attempts,
        } => {
            debug!("{} did not {} after {} attempts", locator, condition, attempts);
            Err(HarnessError::from_timeout(locator, condition, action, last, waited))
        }
    }
}

pub(crate) fn live_value(dom: &DomSnapshot, handle: ElementHandle) -> Option<&str> {
    dom.node(handle.node()).and_then(|node| node.value.as_deref())
}

fn actionable(
    dom: &DomSnapshot,
    locator: &Locator,
    editable: bool,
) -> std::result::Result<ElementHandle, Observation> {
    let handle = single(dom, locator)?;
    let Some(node) = dom.node(handle.node()) else {
        return Err(Observation::Absent);
    };
    if !node.visible {
        return Err(Observation::Hidden);
    }
    if node.disabled {
        return Err(Observation::Disabled);
    }
    if editable {
        if node.tag == "select" {
            return Err(Observation::Rejected(
                "<select> takes an option, not typed text".to_string(),
            ));
        }
        if !is_editable(node) {
            return Err(Observation::Rejected(format!(
                "<{}> is not an editable control",
                node.tag
            )));
        }
        if node.has_attr("readonly") {
            return Err(Observation::Rejected("element is read-only".to_string()));
        }
    }
    Ok(handle)
}

fn is_editable(node: &DomNode) -> bool {
    match node.tag.as_str() {
        "textarea" => true,
        "input" => {
            let kind = node.attr("type").unwrap_or("text").to_ascii_lowercase();
            !NON_TEXT_INPUTS.contains(&kind.as_str())
        }
        _ => node.is_content_editable(),
    }
}

fn rejected(error: ActionError) -> anyhow::Result<Probe<()>> {
    match error {
        ActionError::Stale => Ok(Probe::Pending(Observation::Rejected(
            "element was re-rendered before the action".to_string(),
        ))),
        ActionError::NotInteractable(reason) => Ok(Probe::Pending(Observation::Rejected(reason))),
        ActionError::Driver(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "actions_test.rs"]
mod actions_test;
