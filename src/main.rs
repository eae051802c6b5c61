#![allow(clippy::uninlined_format_args)]

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use viewcheck::config::DEFAULT_BASE_URL;
use viewcheck::scenarios::{self, PlayerTarget};
use viewcheck::types::{BrowserType, OutputFormat, ViewportSize};
use viewcheck::webdriver_manager::GLOBAL_WEBDRIVER_MANAGER;
use viewcheck::{
    BrowserOptions, HarnessError, Locator, PageSession, Result, Scenario, ScenarioDriver,
    ScenarioResult, SessionConfig, StepStatus, TextMatch, WaitOptions, WebDriverLauncher,
};

const EXIT_SUCCESS: i32 = 0;

/// Directory artifacts go to when neither --artifact nor --artifact-dir is given
const DEFAULT_ARTIFACT_DIR: &str = "viewcheck-artifacts";

#[derive(Parser)]
#[command(name = "viewcheck")]
#[command(about = "Browser-driven UI verification for single-page admin apps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios, each in a fresh browser session
    Run {
        /// Built-in scenario name, or @path/to/scenario.json
        #[arg(required = true)]
        scenarios: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,

        /// Screenshot path (single scenario only)
        #[arg(long, conflicts_with = "artifact_dir")]
        artifact: Option<PathBuf>,

        /// Directory for screenshots, one per scenario
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Player id used by the built-in scenarios
        #[arg(long, default_value_t = 1)]
        player_id: u32,

        /// Player display name expected in the Mute dialog heading
        #[arg(long, default_value = "playerone")]
        player_name: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// List built-in scenarios
    List {
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Navigate to a route and show what a locator matches
    Resolve {
        /// Route (#/players), path or absolute URL to open first
        target: String,

        /// ARIA role to match
        #[arg(long)]
        role: Option<String>,

        /// Accessible name (with --role)
        #[arg(long, requires = "role")]
        name: Option<String>,

        /// Placeholder text to match
        #[arg(long)]
        placeholder: Option<String>,

        /// CSS selector to match
        #[arg(long)]
        css: Option<String>,

        /// Visible text to match
        #[arg(long)]
        text: Option<String>,

        /// Match name, placeholder or text as a substring
        #[arg(long)]
        contains: bool,

        /// Only look inside elements matching this CSS selector
        #[arg(long)]
        within_css: Option<String>,

        #[command(flatten)]
        session: SessionArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },
}

/// Browser and page session settings shared by commands that open a page
#[derive(Args)]
struct SessionArgs {
    /// Base URL routes are resolved against
    #[arg(long, env = "VIEWCHECK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Browser to use (chrome or firefox)
    #[arg(short, long, env = "VIEWCHECK_BROWSER", default_value = "chrome")]
    browser: BrowserType,

    /// Viewport size (WIDTHxHEIGHT, e.g., 1280x800)
    #[arg(long, default_value = "1280x800")]
    viewport: ViewportSize,

    /// Show the browser window
    #[arg(long)]
    no_headless: bool,

    /// Use this WebDriver instead of finding or starting one
    #[arg(long, env = "VIEWCHECK_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Wait budget per step in milliseconds
    #[arg(long, env = "VIEWCHECK_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Delay between condition checks in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// CSS selector that is visible once a route has rendered
    #[arg(long)]
    root_marker: Option<String>,
}

impl SessionArgs {
    fn session_config(&self) -> Result<SessionConfig> {
        let wait = WaitOptions::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_ms));
        let mut config = SessionConfig::new(&self.base_url)?.with_wait(wait);
        if let Some(marker) = &self.root_marker {
            config = config.with_root_marker(Locator::css(marker)?);
        }
        Ok(config)
    }

    fn launcher(&self) -> WebDriverLauncher {
        WebDriverLauncher::new(BrowserOptions {
            browser: self.browser,
            headless: !self.no_headless,
            viewport: Some(self.viewport),
            webdriver_url: self.webdriver_url.clone(),
        })
    }
}

#[tokio::main]
async fn main() {
    let result = run().await;

    // Drivers we started must not outlive the process
    GLOBAL_WEBDRIVER_MANAGER.stop_all();

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "kind": err.kind(),
                "message": err.to_string(),
                "exit_code": err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

async fn run() -> Result<i32> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viewcheck=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenarios,
            session,
            artifact,
            artifact_dir,
            player_id,
            player_name,
            format,
        } => {
            let player = PlayerTarget {
                id: player_id,
                display_name: player_name,
            };
            handle_run(scenarios, session, artifact, artifact_dir, player, format).await
        }

        Commands::List { format } => {
            handle_list(format)?;
            Ok(EXIT_SUCCESS)
        }

        Commands::Resolve {
            target,
            role,
            name,
            placeholder,
            css,
            text,
            contains,
            within_css,
            session,
            format,
        } => {
            let locator = build_locator(role, name, placeholder, css, text, contains, within_css)?;
            handle_resolve(target, locator, session, format).await?;
            Ok(EXIT_SUCCESS)
        }
    }
}

async fn handle_run(
    names: Vec<String>,
    session: SessionArgs,
    artifact: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    player: PlayerTarget,
    format: OutputFormat,
) -> Result<i32> {
    // Every definition is checked before any browser starts
    let scenarios = names
        .iter()
        .map(|name| load_scenario(name, &player))
        .collect::<Result<Vec<_>>>()?;
    if artifact.is_some() && scenarios.len() > 1 {
        return Err(HarnessError::InvalidScenario(
            "--artifact takes a single scenario; use --artifact-dir for several".to_string(),
        ));
    }

    let driver = ScenarioDriver::new(Arc::new(session.launcher()), session.session_config()?);
    let dir = artifact_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let path = artifact
            .clone()
            .unwrap_or_else(|| artifact_path(&dir, &scenario.name));
        let result = driver.run(scenario, &path).await;
        if matches!(format, OutputFormat::Simple) {
            print_simple(&result);
        }
        results.push(result);
    }

    if matches!(format, OutputFormat::Json) {
        let output = match results.as_slice() {
            [single] => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        }
        .map_err(anyhow::Error::from)?;
        println!("{}", output);
    }

    let failed = results.iter().filter(|r| !r.passed()).count();
    info!("{} of {} scenarios passed", results.len() - failed, results.len());
    Ok(results
        .iter()
        .find(|r| !r.passed())
        .map(ScenarioResult::exit_code)
        .unwrap_or(EXIT_SUCCESS))
}

fn load_scenario(name: &str, player: &PlayerTarget) -> Result<Scenario> {
    match name.strip_prefix('@') {
        Some(path) => Scenario::load(Path::new(path)),
        None => scenarios::builtin(name, player),
    }
}

/// `dir/<name>.png` with the name reduced to filename-safe characters
fn artifact_path(dir: &Path, name: &str) -> PathBuf {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}.png", stem))
}

fn print_simple(result: &ScenarioResult) {
    let artifact = result
        .artifact()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "no artifact".to_string());
    if result.passed() {
        println!(
            "PASS {} ({}ms) -> {}",
            result.scenario(),
            result.duration_ms(),
            artifact
        );
        return;
    }

    println!("FAIL {} ({}ms) -> {}", result.scenario(), result.duration_ms(), artifact);
    for step in result.steps() {
        let mark = match step.status {
            StepStatus::Passed => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
        };
        println!("  {:>2}. [{}] {}", step.index + 1, mark, step.label);
    }
    if let Some(failure) = result.failure() {
        println!("  {}: {}", failure.kind, failure.message);
        for line in &failure.console_errors {
            println!("  console: {}", line);
        }
    }
}

fn handle_list(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let list: Vec<_> = scenarios::BUILTIN
                .iter()
                .map(|(name, description)| json!({"name": name, "description": description}))
                .collect();
            let output = serde_json::to_string_pretty(&list).map_err(anyhow::Error::from)?;
            println!("{}", output);
        }
        OutputFormat::Simple => {
            for (name, description) in scenarios::BUILTIN {
                println!("{:<18} {}", name, description);
            }
        }
    }
    Ok(())
}

fn build_locator(
    role: Option<String>,
    name: Option<String>,
    placeholder: Option<String>,
    css: Option<String>,
    text: Option<String>,
    contains: bool,
    within_css: Option<String>,
) -> Result<Locator> {
    let text_match = |s: String| {
        if contains {
            TextMatch::contains(s)
        } else {
            TextMatch::exact(s)
        }
    };

    let query = match (role, placeholder, css, text) {
        (Some(role), None, None, None) => match name {
            Some(name) => Locator::role_named(&role, text_match(name)),
            None => Locator::role(&role),
        },
        (None, Some(placeholder), None, None) => Locator::placeholder(text_match(placeholder)),
        (None, None, Some(css), None) => Locator::css(&css)?,
        (None, None, None, Some(text)) => Locator::text(text_match(text)),
        _ => {
            return Err(HarnessError::InvalidLocator(
                "give exactly one of --role, --placeholder, --css or --text".to_string(),
            ));
        }
    };

    match within_css {
        Some(scope) => Ok(Locator::css(&scope)?.within(query)),
        None => Ok(query),
    }
}

async fn handle_resolve(
    target: String,
    locator: Locator,
    args: SessionArgs,
    format: OutputFormat,
) -> Result<()> {
    let launcher = args.launcher();
    let mut session = PageSession::open(&launcher, args.session_config()?).await?;

    let outcome = async {
        session.navigate(&target).await?;
        let url = session.current_url().await?;
        let matches = session.inspect(&locator).await?;
        Ok::<_, HarnessError>((url, matches))
    }
    .await;
    session.close().await?;
    let (url, matches) = outcome?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::to_string_pretty(&json!({
                "url": url.as_str(),
                "locator": locator.to_string(),
                "count": matches.len(),
                "matches": matches,
            }))
            .map_err(anyhow::Error::from)?;
            println!("{}", output);
        }
        OutputFormat::Simple => {
            println!("{} matches for {} at {}", matches.len(), locator, url);
            for summary in &matches {
                println!(
                    "  [{}] <{}> role={} name={:?} text={:?}{}{}",
                    summary.index,
                    summary.tag,
                    summary.role.as_deref().unwrap_or("-"),
                    summary.name,
                    summary.text,
                    if summary.visible { "" } else { " hidden" },
                    if summary.disabled { " disabled" } else { "" },
                );
            }
        }
    }
    Ok(())
}
