use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::types::BrowserType;

/// Readiness polls after spawning a driver (3 seconds total)
const STARTUP_ATTEMPTS: u32 = 30;
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Finds, starts and stops WebDriver processes (chromedriver, geckodriver)
#[derive(Default)]
pub struct WebDriverManager {
    processes: Mutex<Vec<DriverProcess>>,
}

struct DriverProcess {
    browser: BrowserType,
    child: Child,
    port: u16,
    url: String,
}

impl WebDriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn processes(&self) -> MutexGuard<'_, Vec<DriverProcess>> {
        self.processes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// URL of a ready driver for `browser`, starting one when none answers
    pub async fn ensure_driver(&self, browser: BrowserType) -> Result<String> {
        let managed: Vec<String> = self
            .processes()
            .iter()
            .filter(|p| p.browser == browser)
            .map(|p| p.url.clone())
            .collect();
        for url in managed {
            if Self::is_driver_ready(&url).await {
                debug!("Using managed {} at {}", browser.driver_name(), url);
                return Ok(url);
            }
        }

        let standard = format!("http://localhost:{}", browser.default_port());
        if Self::is_driver_ready(&standard).await {
            debug!("Found running {} at {}", browser.driver_name(), standard);
            return Ok(standard);
        }

        info!("No {} answering, starting one", browser.driver_name());
        self.start_driver(browser).await
    }

    /// Stop the drivers we started for `browser` and start a fresh one
    pub async fn restart_driver(&self, browser: BrowserType) -> Result<String> {
        let stale: Vec<DriverProcess> = {
            let mut processes = self.processes();
            let (stale, keep): (Vec<_>, Vec<_>) =
                processes.drain(..).partition(|p| p.browser == browser);
            *processes = keep;
            stale
        };
        for process in stale {
            Self::terminate(process);
        }
        sleep(Duration::from_millis(500)).await;
        self.start_driver(browser).await
    }

    async fn start_driver(&self, browser: BrowserType) -> Result<String> {
        let command = browser.driver_name();
        if !Self::command_exists(command) {
            anyhow::bail!(
                "{} not found in PATH. Install it or pass --webdriver-url:\n\
                  macOS: brew install {}\n\
                  Linux: download it from the official releases",
                command,
                command
            );
        }

        let port = Self::find_free_port(browser)?;
        let port_arg = match browser {
            BrowserType::Firefox => vec!["--port".to_string(), port.to_string()],
            BrowserType::Chrome => vec![format!("--port={}", port)],
        };
        info!("Starting {} on port {}", command, port);

        let mut cmd = Command::new(command);
        cmd.args(&port_arg).stdout(Stdio::null()).stderr(Stdio::null());

        // Own process group so the browser children die with the driver
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", command))?;
        let url = format!("http://localhost:{}", port);
        self.processes().push(DriverProcess {
            browser,
            child,
            port,
            url: url.clone(),
        });

        for attempt in 1..=STARTUP_ATTEMPTS {
            if Self::is_driver_ready(&url).await {
                info!("{} ready on port {}", command, port);
                return Ok(url);
            }
            if attempt < STARTUP_ATTEMPTS {
                sleep(STARTUP_POLL).await;
            }
        }

        let failed = {
            let mut processes = self.processes();
            processes
                .iter()
                .position(|p| p.port == port)
                .map(|index| processes.remove(index))
        };
        if let Some(process) = failed {
            Self::terminate(process);
        }
        anyhow::bail!("{} did not become ready on port {}", command, port)
    }

    /// Check if a command exists in PATH
    pub fn command_exists(command: &str) -> bool {
        #[cfg(unix)]
        let probe = Command::new("which").arg(command).output();
        #[cfg(windows)]
        let probe = Command::new("where").arg(command).output();

        probe.map(|output| output.status.success()).unwrap_or(false)
    }

    /// Preferred port for the browser's driver, else one the OS hands out
    pub fn find_free_port(browser: BrowserType) -> Result<u16> {
        for port in browser.preferred_ports() {
            if !Self::is_port_in_use(port) {
                debug!("Port {} is free for {}", port, browser.driver_name());
                return Ok(port);
            }
            debug!("Port {} is in use", port);
        }

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);
        Ok(port)
    }

    pub fn is_port_in_use(port: u16) -> bool {
        std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
    }

    /// Whether a driver at `url` answers `/status` with `ready: true`
    pub async fn is_driver_ready(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));
        let response = reqwest::Client::new()
            .get(&status_url)
            .timeout(Duration::from_secs(1))
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => response
                .json::<serde_json::Value>()
                .await
                .map(|body| status_is_ready(&body))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Stop every driver this manager started
    pub fn stop_all(&self) {
        let processes: Vec<DriverProcess> = self.processes().drain(..).collect();
        for process in processes {
            Self::terminate(process);
        }
    }

    fn terminate(mut process: DriverProcess) {
        debug!(
            "Stopping {} on port {}",
            process.browser.driver_name(),
            process.port
        );
        #[cfg(unix)]
        Self::kill_process_group(process.child.id() as i32);

        if let Err(e) = process.child.kill() {
            debug!("Driver on port {} already gone: {}", process.port, e);
        }
        if let Err(e) = process.child.wait() {
            warn!("Could not reap driver on port {}: {}", process.port, e);
        }
    }

    /// SIGTERM the group, then SIGKILL whatever is left
    #[cfg(unix)]
    fn kill_process_group(pgid: i32) {
        if let Err(e) = Command::new("kill")
            .args(["-TERM", &format!("-{}", pgid)])
            .output()
        {
            debug!("Failed to send SIGTERM to process group {}: {}", pgid, e);
        }

        std::thread::sleep(Duration::from_millis(100));

        if let Err(e) = Command::new("kill")
            .args(["-KILL", &format!("-{}", pgid)])
            .output()
        {
            debug!("Failed to send SIGKILL to process group {}: {}", pgid, e);
        }
    }
}

impl Drop for WebDriverManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// `{"value": {"ready": true}}` per the WebDriver status endpoint
fn status_is_ready(body: &serde_json::Value) -> bool {
    body.get("value")
        .and_then(|v| v.get("ready"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

lazy_static::lazy_static! {
    pub static ref GLOBAL_WEBDRIVER_MANAGER: WebDriverManager = WebDriverManager::new();
}

#[cfg(test)]
#[path = "webdriver_manager_test.rs"]
mod webdriver_manager_test;
