//! Session and browser configuration

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{HarnessError, Result};
use crate::locator::Locator;
use crate::types::{BrowserType, ViewportSize};
use crate::wait::WaitOptions;

/// Default admin app address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/";

/// Selector that is visible once the single-page app has rendered a route
pub const DEFAULT_ROOT_MARKER: &str = "#root > *";

/// Per-run page session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// URL relative routes are resolved against
    pub base_url: Url,
    /// Wait budget for every locate/act/assert call
    pub wait: WaitOptions,
    /// Visible once a navigation has settled
    pub root_marker: Locator,
}

impl SessionConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HarnessError::Other(anyhow::anyhow!("Invalid base URL '{}': {}", base_url, e)))?;
        Ok(Self {
            base_url,
            wait: WaitOptions::default(),
            root_marker: Locator::css(DEFAULT_ROOT_MARKER)?,
        })
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_root_marker(mut self, root_marker: Locator) -> Self {
        self.root_marker = root_marker;
        self
    }
}

/// How to obtain a browser for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub browser: BrowserType,
    pub headless: bool,
    pub viewport: Option<ViewportSize>,
    /// Use this WebDriver instead of locating or starting one
    pub webdriver_url: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            browser: BrowserType::default(),
            headless: true,
            viewport: Some(ViewportSize {
                width: 1280,
                height: 800,
            }),
            webdriver_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("http://localhost:3000").unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.wait.timeout, Duration::from_millis(5000));
        assert_eq!(config.root_marker.to_string(), "css=#root > *");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(SessionConfig::new("not a url").is_err());
    }

    #[test]
    fn test_browser_defaults() {
        let options = BrowserOptions::default();
        assert!(options.headless);
        assert_eq!(options.browser, BrowserType::Chrome);
        assert!(options.webdriver_url.is_none());
    }
}
