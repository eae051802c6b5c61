use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::BrowserOptions;
use crate::dom::DomSnapshot;
use crate::locator::ElementHandle;
use crate::page::{ActionError, Launcher, PageBackend};
use crate::types::{BrowserType, ConsoleMessage};
use crate::webdriver_manager::GLOBAL_WEBDRIVER_MANAGER;

/// Attribute used to hand a snapshot node to a native WebDriver lookup
const TARGET_ATTR: &str = "data-viewcheck-target";

/// Captures the element tree in pre-order and keeps the live nodes for
/// later actions. `arguments[0]` is the generation number.
const SNAPSHOT_SCRIPT: &str = r#"
    const generation = arguments[0];
    const skip = new Set(['head', 'script', 'style', 'noscript', 'template']);
    const live = [];
    const nodes = [];

    function visit(el, parent, parentShown) {
        const id = nodes.length;
        const style = window.getComputedStyle(el);
        const shown = parentShown && style.display !== 'none';
        const rendered = shown && style.visibility !== 'hidden' && style.visibility !== 'collapse';
        const rect = el.getBoundingClientRect();
        const visible = rendered && rect.width > 0 && rect.height > 0 && parseFloat(style.opacity) !== 0;
        const attributes = {};
        for (const attr of el.attributes) {
            attributes[attr.name] = attr.value;
        }
        const node = {
            id: id,
            parent: parent,
            tag: el.tagName.toLowerCase(),
            attributes: attributes,
            content: [],
            rendered: rendered,
            visible: visible,
            disabled: !!el.disabled
        };
        if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement || el instanceof HTMLSelectElement) {
            node.value = el.value;
        } else if (el.isContentEditable && el.getAttribute('contenteditable') !== null) {
            node.value = el.innerText;
        }
        nodes.push(node);
        live.push(el);

        for (const child of el.childNodes) {
            if (child.nodeType === Node.TEXT_NODE) {
                node.content.push(child.textContent);
            } else if (child.nodeType === Node.ELEMENT_NODE && !skip.has(child.tagName.toLowerCase())) {
                node.content.push(visit(child, id, shown));
            }
        }
        return id;
    }

    visit(document.documentElement, null, true);
    window.__viewcheckNodes = live;
    window.__viewcheckGeneration = generation;
    return { generation: generation, url: location.href, nodes: nodes };
"#;

/// Tags the node behind a handle so a native WebDriver find can reach it
const MARK_SCRIPT: &str = r#"
    const [index, generation, token, attr] = arguments;
    if (window.__viewcheckGeneration !== generation || !window.__viewcheckNodes) {
        return 'stale';
    }
    const el = window.__viewcheckNodes[index];
    if (!el || !el.isConnected) {
        return 'detached';
    }
    el.scrollIntoView({ block: 'center', inline: 'center' });
    el.setAttribute(attr, token);
    return 'ok';
"#;

const CONSOLE_CAPTURE_SCRIPT: &str = r#"
    (function() {
        if (window.__viewcheckConsole) return;
        window.__viewcheckConsole = [];

        function record(level, args) {
            const message = Array.from(args).map(arg => {
                if (typeof arg === 'object') {
                    try {
                        return JSON.stringify(arg);
                    } catch (e) {
                        return String(arg);
                    }
                }
                return String(arg);
            }).join(' ');
            window.__viewcheckConsole.push({
                level: level,
                message: message,
                timestamp: new Date().toISOString()
            });
            if (window.__viewcheckConsole.length > 500) {
                window.__viewcheckConsole.shift();
            }
        }

        for (const level of ['log', 'info', 'warn', 'error']) {
            const original = console[level];
            console[level] = function(...args) {
                record(level, args);
                original.apply(console, args);
            };
        }
        window.addEventListener('error', function(event) {
            record('error', [`Uncaught ${event.error || event.message} at ${event.filename}:${event.lineno}`]);
        });
        window.addEventListener('unhandledrejection', function(event) {
            record('error', [`Unhandled Promise Rejection: ${event.reason}`]);
        });
    })();
"#;

/// One browser tab driven over WebDriver
pub struct WebDriverPage {
    client: Client,
    browser: BrowserType,
    generation: AtomicU64,
    /// Console output of documents we navigated away from
    console_history: Mutex<Vec<ConsoleMessage>>,
    profile: Option<TempDir>,
    closed: bool,
}

impl WebDriverPage {
    async fn install_console_capture(&self) {
        if let Err(e) = self.client.execute(CONSOLE_CAPTURE_SCRIPT, vec![]).await {
            debug!("Console capture not installed: {}", e);
        }
    }

    async fn page_console(&self) -> Result<Vec<ConsoleMessage>> {
        let value = self
            .client
            .execute("return window.__viewcheckConsole || [];", vec![])
            .await
            .context("Failed to read console messages")?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Mark the handle's node and find it natively
    async fn locate(&self, target: ElementHandle) -> std::result::Result<fantoccini::elements::Element, ActionError> {
        let token = Uuid::new_v4().simple().to_string();
        let status = self
            .client
            .execute(
                MARK_SCRIPT,
                vec![
                    json!(target.node()),
                    json!(target.generation()),
                    json!(token),
                    json!(TARGET_ATTR),
                ],
            )
            .await
            .map_err(|e| ActionError::Driver(e.into()))?;
        match status.as_str() {
            Some("ok") => {}
            Some("stale") | Some("detached") => return Err(ActionError::Stale),
            other => {
                return Err(ActionError::Driver(anyhow::anyhow!(
                    "Unexpected mark result: {:?}",
                    other
                )));
            }
        }

        let selector = format!("[{}='{}']", TARGET_ATTR, token);
        let element = self
            .client
            .find(WdLocator::Css(&selector))
            .await
            .map_err(classify)?;
        Ok(element)
    }

    async fn unmark(&self) {
        let script = format!(
            "document.querySelectorAll('[{0}]').forEach(el => el.removeAttribute('{0}'));",
            TARGET_ATTR
        );
        if let Err(e) = self.client.execute(&script, vec![]).await {
            debug!("Could not clear action marker: {}", e);
        }
    }
}

/// Map a WebDriver command error onto the retryable action failures
fn classify(error: fantoccini::error::CmdError) -> ActionError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("stale element") || lower.contains("no such element") {
        ActionError::Stale
    } else if lower.contains("not interactable") || lower.contains("intercepted") {
        ActionError::NotInteractable(message)
    } else {
        ActionError::Driver(error.into())
    }
}

#[async_trait]
impl PageBackend for WebDriverPage {
    async fn navigate(&self, url: &Url) -> Result<()> {
        // Keep the console output of the document being left
        if let Ok(messages) = self.page_console().await {
            self.console_history.lock().await.extend(messages);
        }

        self.client
            .goto(url.as_str())
            .await
            .with_context(|| format!("Failed to load {}", url))?;

        let ready_script = "return document.readyState === 'complete';";
        for _ in 0..20 {
            match self.client.execute(ready_script, vec![]).await {
                Ok(ready) if ready.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
            }
        }

        self.install_console_capture().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<Url> {
        Ok(self.client.current_url().await?)
    }

    async fn snapshot(&self) -> Result<DomSnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let value = self
            .client
            .execute(SNAPSHOT_SCRIPT, vec![json!(generation)])
            .await
            .context("Failed to capture DOM")?;
        serde_json::from_value(value).context("Malformed DOM snapshot")
    }

    async fn click(&self, target: ElementHandle) -> std::result::Result<(), ActionError> {
        let element = self.locate(target).await?;
        let result = element.click().await.map_err(classify);
        self.unmark().await;
        result
    }

    async fn fill(&self, target: ElementHandle, text: &str) -> std::result::Result<(), ActionError> {
        let element = self.locate(target).await?;
        let result = async {
            element.clear().await.map_err(classify)?;
            if !text.is_empty() {
                element.send_keys(text).await.map_err(classify)?;
            }
            Ok::<(), ActionError>(())
        }
        .await;
        self.unmark().await;
        result
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .context("Failed to take screenshot")
    }

    async fn console_messages(&self) -> Result<Vec<ConsoleMessage>> {
        let mut messages = self.console_history.lock().await.clone();
        messages.extend(self.page_console().await.unwrap_or_default());
        Ok(messages)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing {} session", self.browser);
        let result = self
            .client
            .clone()
            .close()
            .await
            .context("Failed to close WebDriver session");

        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                warn!("Could not remove profile {}: {}", path.display(), e);
            }
        }
        result
    }
}

/// Opens one WebDriver session per page session
pub struct WebDriverLauncher {
    options: BrowserOptions,
}

impl WebDriverLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn capabilities(&self, profile: Option<&TempDir>) -> serde_json::Map<String, serde_json::Value> {
        let mut caps = serde_json::Map::new();
        match self.options.browser {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if self.options.headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &self.options.viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if self.options.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &self.options.viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }
                if let Some(profile) = profile {
                    args.push(format!("--user-data-dir={}", profile.path().display()));
                }
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }
        caps
    }

    async fn connect(&self, caps: serde_json::Map<String, serde_json::Value>) -> Result<Client> {
        let browser = self.options.browser;
        let webdriver_url = match &self.options.webdriver_url {
            Some(url) => url.clone(),
            None => GLOBAL_WEBDRIVER_MANAGER.ensure_driver(browser).await?,
        };
        debug!("Connecting to WebDriver at {}", webdriver_url);

        match ClientBuilder::rustls()
            .capabilities(caps.clone())
            .connect(&webdriver_url)
            .await
        {
            Ok(client) => Ok(client),
            Err(e) => {
                let message = e.to_string();
                let recoverable = message.contains("session not created")
                    || message.contains("Session is already started");
                if !recoverable || self.options.webdriver_url.is_some() {
                    return Err(e).with_context(|| format!("Failed to connect to WebDriver at {}", webdriver_url));
                }

                info!("{} is in a bad state, restarting it", browser.driver_name());
                let fresh = GLOBAL_WEBDRIVER_MANAGER
                    .restart_driver(browser)
                    .await
                    .context("Failed to restart WebDriver")?;
                ClientBuilder::rustls()
                    .capabilities(caps)
                    .connect(&fresh)
                    .await
                    .context("Failed to connect to WebDriver after restart")
            }
        }
    }
}

#[async_trait]
impl Launcher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn PageBackend>> {
        info!("Launching {} (headless: {})", self.options.browser, self.options.headless);

        // Chrome refuses to share a profile directory between sessions
        let profile = match self.options.browser {
            BrowserType::Chrome => Some(
                tempfile::Builder::new()
                    .prefix("viewcheck-chrome-")
                    .tempdir()
                    .context("Failed to create browser profile directory")?,
            ),
            BrowserType::Firefox => None,
        };

        let client = self.connect(self.capabilities(profile.as_ref())).await?;

        if let Some(vp) = self.options.viewport
            && let Err(e) = client.set_window_size(vp.width, vp.height).await
        {
            debug!("Could not set window size to {}: {}", vp, e);
        }

        Ok(Box::new(WebDriverPage {
            client,
            browser: self.options.browser,
            generation: AtomicU64::new(0),
            console_history: Mutex::new(Vec::new()),
            profile,
            closed: false,
        }))
    }
}
