//! Page sessions and the browser seam
//!
//! [`PageBackend`] is the only place the engine talks to a browser. The
//! WebDriver implementation lives in [`crate::webdriver`]; tests plug in an
//! in-memory app instead.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::aria;
use crate::config::SessionConfig;
use crate::dom::DomSnapshot;
use crate::errors::{HarnessError, Result};
use crate::locator::{ElementHandle, Locator};
use crate::types::ConsoleMessage;
use crate::wait::{Probe, WaitOutcome, await_condition};

/// Why the browser refused an element action
#[derive(Debug, Error)]
pub enum ActionError {
    /// Handle is from an older snapshot or its node was detached
    #[error("element is stale")]
    Stale,
    /// Element exists but the browser would not interact with it
    #[error("element not interactable: {0}")]
    NotInteractable(String),
    /// The driver itself failed
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// One live browser tab
#[async_trait]
pub trait PageBackend: Send + Sync {
    async fn navigate(&self, url: &Url) -> anyhow::Result<()>;

    async fn current_url(&self) -> anyhow::Result<Url>;

    /// Capture the current DOM; each call yields a newer generation
    async fn snapshot(&self) -> anyhow::Result<DomSnapshot>;

    async fn click(&self, target: ElementHandle) -> std::result::Result<(), ActionError>;

    /// Replace the control's value with `text`
    async fn fill(&self, target: ElementHandle, text: &str) -> std::result::Result<(), ActionError>;

    /// PNG image of the viewport
    async fn screenshot(&self) -> anyhow::Result<Vec<u8>>;

    async fn console_messages(&self) -> anyhow::Result<Vec<ConsoleMessage>> {
        Ok(Vec::new())
    }

    /// Release the tab and everything behind it
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Creates one backend per page session
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn PageBackend>>;
}

/// Live connection to one browser tab, owned by a single scenario run
pub struct PageSession {
    id: Uuid,
    backend: Option<Box<dyn PageBackend>>,
    config: SessionConfig,
    pub(crate) route: Option<Url>,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("id", &self.id)
            .field("open", &self.backend.is_some())
            .field("route", &self.route.as_ref().map(Url::as_str))
            .finish()
    }
}

impl PageSession {
    pub async fn open(launcher: &dyn Launcher, config: SessionConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let backend = launcher
            .launch()
            .await
            .map_err(|e| HarnessError::WebDriverFailed(format!("{:#}", e)))?;
        info!("Opened page session {}", id);
        Ok(Self {
            id,
            backend: Some(backend),
            config,
            route: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Last route navigated to
    pub fn route(&self) -> Option<&Url> {
        self.route.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    pub(crate) fn backend(&self) -> Result<&dyn PageBackend> {
        self.backend.as_deref().ok_or(HarnessError::SessionClosed)
    }

    pub(crate) async fn snapshot(&self) -> anyhow::Result<DomSnapshot> {
        let dom = self.backend()?.snapshot().await?;
        debug!("Snapshot generation {} with {} nodes", dom.generation(), dom.len());
        Ok(dom)
    }

    /// Resolve a navigation target: absolute URL, path, or `#/hash` route
    pub fn resolve_url(&self, target: &str) -> Result<Url> {
        let target = target.trim();
        if let Some(fragment) = target.strip_prefix('#') {
            let mut url = self.config.base_url.clone();
            url.set_fragment(Some(fragment));
            return Ok(url);
        }
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        self.config.base_url.join(target).map_err(|e| {
            HarnessError::InvalidScenario(format!("cannot navigate to '{}': {}", target, e))
        })
    }

    /// Current URL as reported by the browser
    pub async fn current_url(&self) -> Result<Url> {
        self.backend()?
            .current_url()
            .await
            .map_err(|e| HarnessError::WebDriverFailed(format!("{:#}", e)))
    }

    /// Write a screenshot to `path`, replacing any previous file
    pub async fn capture(&self, path: &Path) -> Result<PathBuf> {
        let png = self
            .backend()?
            .screenshot()
            .await
            .map_err(|e| HarnessError::WebDriverFailed(format!("{:#}", e)))?;

        let artifact_err = |source| HarnessError::Artifact {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(artifact_err)?;
        }
        tokio::fs::write(path, &png).await.map_err(artifact_err)?;
        info!("Captured {} ({} bytes)", path.display(), png.len());
        Ok(path.to_path_buf())
    }

    /// Console errors logged by the page so far; best effort
    pub async fn console_errors(&self) -> Vec<String> {
        let Ok(backend) = self.backend() else {
            return Vec::new();
        };
        match backend.console_messages().await {
            Ok(messages) => messages
                .into_iter()
                .filter(ConsoleMessage::is_error)
                .map(|m| m.message)
                .collect(),
            Err(e) => {
                debug!("Could not read console messages: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Resolve `locator` once the page can be read, without requiring a match
    pub async fn inspect(&self, locator: &Locator) -> Result<Vec<ElementSummary>> {
        let outcome = await_condition(
            move || async move {
                let dom = self.snapshot().await?;
                let handles = locator.resolve(&dom, None);
                let summaries = handles
                    .iter()
                    .enumerate()
                    .map(|(index, handle)| ElementSummary::describe(&dom, index, handle))
                    .collect::<Vec<_>>();
                Ok(Probe::Ready(summaries))
            },
            &self.config.wait,
        )
        .await;
        match outcome {
            WaitOutcome::Resolved(summaries) => Ok(summaries),
            WaitOutcome::TimedOut { last, .. } => Err(HarnessError::WebDriverFailed(last.to_string())),
        }
    }

    /// Tear down the backend. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        info!("Closing page session {}", self.id);
        backend
            .close()
            .await
            .map_err(|e| HarnessError::WebDriverFailed(format!("{:#}", e)))
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };
        let id = self.id;
        warn!("Page session {} dropped while open, closing in background", id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = backend.close().await {
                        warn!("Failed to close page session {}: {:#}", id, e);
                    }
                });
            }
            Err(_) => warn!("No async runtime to close page session {}", id),
        }
    }
}

/// Diagnostic view of one resolved element
#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub index: usize,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub name: String,
    pub text: String,
    pub visible: bool,
    pub disabled: bool,
}

impl ElementSummary {
    fn describe(dom: &DomSnapshot, index: usize, handle: &ElementHandle) -> Self {
        let id = handle.node();
        match dom.node(id) {
            Some(node) => Self {
                index,
                tag: node.tag.clone(),
                role: aria::role_of(dom, node).map(|r| r.into_owned()),
                name: aria::accessible_name(dom, id),
                text: dom.text_content(id),
                visible: node.visible,
                disabled: node.disabled,
            },
            None => Self {
                index,
                tag: String::new(),
                role: None,
                name: String::new(),
                text: String::new(),
                visible: false,
                disabled: false,
            },
        }
    }
}
