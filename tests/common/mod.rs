// Simulated admin app for driving the harness without a browser

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use viewcheck::scenarios::{MUTE_DURATION_PLACEHOLDER, MUTE_REASON_PLACEHOLDER};
use viewcheck::types::ConsoleMessage;
use viewcheck::{
    ActionError, DomSnapshot, ElementBuilder, ElementHandle, Launcher, PageBackend, SessionConfig,
    WaitOptions,
};

pub const BASE_URL: &str = "http://admin.test/";

/// Knobs for the simulated app
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// (id, display name) rows of the players table
    pub players: Vec<(u32, String)>,
    /// Snapshots taken after navigation before the route renders
    pub mount_delay: u32,
    /// Snapshots taken after a dialog opens before it renders
    pub dialog_delay: u32,
    /// Mute and Wager forms share one reason value
    pub shared_reason_state: bool,
    /// The duration field silently truncates typed text
    pub duration_max_len: Option<usize>,
    /// Rows rendered twice, as in a table with a duplicated tbody
    pub duplicate_rows: bool,
    pub console_errors: Vec<String>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            players: vec![(1, "playerone".to_string()), (2, "playertwo".to_string())],
            mount_delay: 2,
            dialog_delay: 1,
            shared_reason_state: false,
            duration_max_len: None,
            duplicate_rows: false,
            console_errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Profile,
    Actions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogForm {
    None,
    Mute,
    Wager,
}

#[derive(Debug)]
struct AppState {
    url: Option<Url>,
    mount_pending: u32,
    tab: Tab,
    /// Player page mute dialog
    mute_dialog: bool,
    /// Players table dialog, by player id
    player_dialog: Option<u32>,
    dialog_pending: u32,
    form: DialogForm,
    duration: String,
    mute_reason: String,
    wager_reason: String,
    clicks: Vec<String>,
}

impl AppState {
    fn fresh(url: Option<Url>, options: &AppOptions) -> Self {
        Self {
            url,
            mount_pending: options.mount_delay,
            tab: Tab::Profile,
            mute_dialog: false,
            player_dialog: None,
            dialog_pending: 0,
            form: DialogForm::None,
            duration: String::new(),
            mute_reason: String::new(),
            wager_reason: String::new(),
            clicks: Vec::new(),
        }
    }

    fn route(&self) -> &str {
        self.url.as_ref().and_then(Url::fragment).unwrap_or("")
    }
}

/// One tab of the simulated app
pub struct FakeAdminApp {
    options: AppOptions,
    generation: AtomicU64,
    state: Mutex<AppState>,
    last: Mutex<Option<DomSnapshot>>,
    closed: AtomicBool,
}

impl FakeAdminApp {
    pub fn new(options: AppOptions) -> Arc<Self> {
        let state = AppState::fresh(None, &options);
        Arc::new(Self {
            options,
            generation: AtomicU64::new(0),
            state: Mutex::new(state),
            last: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// data-key of every element clicked, in order
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn duration_value(&self) -> String {
        self.state.lock().unwrap().duration.clone()
    }

    fn player_name(&self, id: u32) -> Option<&str> {
        self.options
            .players
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, name)| name.as_str())
    }

    fn render(&self) -> DomSnapshot {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        let url = state
            .url
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| "about:blank".to_string());

        let mut root = ElementBuilder::new("div").attr("id", "root");
        if state.url.is_some() {
            if state.mount_pending > 0 {
                state.mount_pending -= 1;
            } else {
                root = root.child(self.render_route(&mut state));
            }
        }

        let body = ElementBuilder::new("body")
            .child(ElementBuilder::new("nav").child(ElementBuilder::new("a").attr("href", "#/players").text("Players")))
            .child(root);
        let dom = DomSnapshot::from_tree(generation, url, body);
        *self.last.lock().unwrap() = Some(dom.clone());
        dom
    }

    fn render_route(&self, state: &mut AppState) -> ElementBuilder {
        let route = state.route().to_string();
        if route == "/players" {
            return self.render_players(state);
        }
        if let Some(id) = route.strip_prefix("/player/").and_then(|id| id.parse::<u32>().ok()) {
            return self.render_player(state, id);
        }
        ElementBuilder::new("main").child(ElementBuilder::new("p").text("Page not found"))
    }

    fn render_player(&self, state: &mut AppState, id: u32) -> ElementBuilder {
        let Some(name) = self.player_name(id) else {
            return ElementBuilder::new("main").child(ElementBuilder::new("p").text("Player not found"));
        };

        let tab = |label: &str, key: &str, selected: bool| {
            ElementBuilder::new("button")
                .attr("role", "tab")
                .attr("data-key", key)
                .attr("aria-selected", if selected { "true" } else { "false" })
                .text(label)
        };
        let mut profile = ElementBuilder::new("div")
            .attr("role", "tabpanel")
            .child(ElementBuilder::new("p").text("Balance: 120.00"));
        let mut actions = ElementBuilder::new("div")
            .attr("role", "tabpanel")
            .child(ElementBuilder::new("button").attr("data-key", "open-mute").text("Mute"))
            .child(ElementBuilder::new("button").attr("data-key", "kick").text("Kick"));
        match state.tab {
            Tab::Profile => actions = actions.hidden(),
            Tab::Actions => profile = profile.hidden(),
        }

        let mut main = ElementBuilder::new("main")
            .child(ElementBuilder::new("h1").text(&format!("Player {}", name)))
            .child(
                ElementBuilder::new("div")
                    .attr("role", "tablist")
                    .child(tab("Profile", "tab-profile", state.tab == Tab::Profile))
                    .child(tab("Actions", "tab-actions", state.tab == Tab::Actions)),
            )
            .child(profile)
            .child(actions);

        if state.mute_dialog && self.dialog_ready(state) {
            main = main.child(
                ElementBuilder::new("div")
                    .attr("role", "dialog")
                    .attr("aria-modal", "true")
                    .child(ElementBuilder::new("h2").text(&format!("Mute {}", name)))
                    .child(
                        ElementBuilder::new("input")
                            .attr("name", "duration")
                            .attr("placeholder", MUTE_DURATION_PLACEHOLDER)
                            .attr("data-key", "duration")
                            .value(&state.duration),
                    )
                    .child(
                        ElementBuilder::new("textarea")
                            .attr("name", "reason")
                            .attr("placeholder", MUTE_REASON_PLACEHOLDER)
                            .attr("data-key", "mute-reason")
                            .value(&state.mute_reason),
                    )
                    .child(ElementBuilder::new("button").attr("data-key", "close").text("Cancel"))
                    .child(ElementBuilder::new("button").text("Submit")),
            );
        }
        main
    }

    fn render_players(&self, state: &mut AppState) -> ElementBuilder {
        let rows = || {
            self.options.players.iter().map(|(id, name)| {
                ElementBuilder::new("tr")
                    .attr("data-key", &format!("row-{}", id))
                    .child(ElementBuilder::new("td").text(name))
                    .child(ElementBuilder::new("td").text("active"))
            })
        };
        let mut table = ElementBuilder::new("table")
            .child(
                ElementBuilder::new("thead").child(
                    ElementBuilder::new("tr")
                        .child(ElementBuilder::new("th").text("Name"))
                        .child(ElementBuilder::new("th").text("Status")),
                ),
            )
            .child(ElementBuilder::new("tbody").children(rows()));
        if self.options.duplicate_rows {
            table = table.child(ElementBuilder::new("tbody").children(rows()));
        }

        let mut main = ElementBuilder::new("main")
            .child(ElementBuilder::new("h1").text("Players"))
            .child(table);

        if let Some(id) = state.player_dialog
            && self.dialog_ready(state)
        {
            let name = self.player_name(id).unwrap_or("unknown");
            let mut dialog = ElementBuilder::new("div")
                .attr("role", "dialog")
                .child(ElementBuilder::new("h2").text(name))
                .child(ElementBuilder::new("button").attr("data-key", "dialog-mute").text("Mute"))
                .child(ElementBuilder::new("button").attr("data-key", "dialog-wager").text("Wager"));

            match state.form {
                DialogForm::None => {}
                DialogForm::Mute => {
                    dialog = dialog.child(
                        ElementBuilder::new("form")
                            .child(
                                ElementBuilder::new("input")
                                    .attr("name", "duration")
                                    .attr("placeholder", MUTE_DURATION_PLACEHOLDER)
                                    .attr("data-key", "duration")
                                    .value(&state.duration),
                            )
                            .child(
                                ElementBuilder::new("textarea")
                                    .attr("name", "reason")
                                    .attr("placeholder", MUTE_REASON_PLACEHOLDER)
                                    .attr("data-key", "mute-reason")
                                    .value(&state.mute_reason),
                            )
                            .child(ElementBuilder::new("button").attr("type", "submit").text("Apply")),
                    );
                }
                DialogForm::Wager => {
                    let reason = if self.options.shared_reason_state {
                        &state.mute_reason
                    } else {
                        &state.wager_reason
                    };
                    dialog = dialog.child(
                        ElementBuilder::new("form")
                            .child(ElementBuilder::new("label").attr("for", "reason").text("Reason"))
                            .child(
                                ElementBuilder::new("input")
                                    .attr("id", "reason")
                                    .attr("data-key", "wager-reason")
                                    .value(reason),
                            )
                            .child(ElementBuilder::new("label").attr("for", "amount").text("Amount"))
                            .child(ElementBuilder::new("input").attr("id", "amount").attr("type", "number").value(""))
                            .child(ElementBuilder::new("button").attr("type", "submit").text("Apply")),
                    );
                }
            }
            main = main.child(dialog);
        }
        main
    }

    fn dialog_ready(&self, state: &mut AppState) -> bool {
        if state.dialog_pending > 0 {
            state.dialog_pending -= 1;
            return false;
        }
        true
    }

    /// data-key of the element behind `target`, if it is from the latest snapshot
    fn target_key(&self, target: ElementHandle) -> Result<Option<String>, ActionError> {
        let last = self.last.lock().unwrap();
        let dom = last.as_ref().ok_or(ActionError::Stale)?;
        if dom.generation() != target.generation() {
            return Err(ActionError::Stale);
        }
        let node = dom.node(target.node()).ok_or(ActionError::Stale)?;
        Ok(node.attr("data-key").map(str::to_string))
    }

    fn ensure_open(&self) -> anyhow::Result<()> {
        if self.is_closed() {
            anyhow::bail!("browser window has been closed");
        }
        Ok(())
    }
}

/// `PageBackend` over a shared simulated app
pub struct FakePage(pub Arc<FakeAdminApp>);

#[async_trait]
impl PageBackend for FakePage {
    async fn navigate(&self, url: &Url) -> anyhow::Result<()> {
        self.0.ensure_open()?;
        *self.0.state.lock().unwrap() = AppState::fresh(Some(url.clone()), &self.0.options);
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<Url> {
        self.0.ensure_open()?;
        let state = self.0.state.lock().unwrap();
        state.url.clone().ok_or_else(|| anyhow::anyhow!("no page loaded"))
    }

    async fn snapshot(&self) -> anyhow::Result<DomSnapshot> {
        self.0.ensure_open()?;
        Ok(self.0.render())
    }

    async fn click(&self, target: ElementHandle) -> Result<(), ActionError> {
        self.0.ensure_open()?;
        let key = self.0.target_key(target)?.unwrap_or_default();
        let mut state = self.0.state.lock().unwrap();
        match key.as_str() {
            "tab-profile" => state.tab = Tab::Profile,
            "tab-actions" => state.tab = Tab::Actions,
            "open-mute" => {
                state.mute_dialog = true;
                state.dialog_pending = self.0.options.dialog_delay;
                state.duration = "2h".to_string();
            }
            "close" => state.mute_dialog = false,
            "dialog-mute" => state.form = DialogForm::Mute,
            "dialog-wager" => state.form = DialogForm::Wager,
            row if row.starts_with("row-") => {
                state.player_dialog = row[4..].parse().ok();
                state.dialog_pending = self.0.options.dialog_delay;
            }
            _ => {}
        }
        state.clicks.push(key);
        Ok(())
    }

    async fn fill(&self, target: ElementHandle, text: &str) -> Result<(), ActionError> {
        self.0.ensure_open()?;
        let key = self.0.target_key(target)?;
        let mut state = self.0.state.lock().unwrap();
        match key.as_deref() {
            Some("duration") => {
                state.duration = match self.0.options.duration_max_len {
                    Some(max) => text.chars().take(max).collect(),
                    None => text.to_string(),
                };
            }
            Some("mute-reason") => state.mute_reason = text.to_string(),
            Some("wager-reason") if self.0.options.shared_reason_state => {
                state.mute_reason = text.to_string()
            }
            Some("wager-reason") => state.wager_reason = text.to_string(),
            _ => return Err(ActionError::NotInteractable("field is not wired up".to_string())),
        }
        Ok(())
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        self.0.ensure_open()?;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn console_messages(&self) -> anyhow::Result<Vec<ConsoleMessage>> {
        Ok(self
            .0
            .options
            .console_errors
            .iter()
            .map(|message| ConsoleMessage {
                level: "error".to_string(),
                message: message.clone(),
                timestamp: String::new(),
            })
            .collect())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches a fresh simulated app per session and remembers each one
pub struct FakeLauncher {
    options: AppOptions,
    launch_error: Option<String>,
    apps: Mutex<Vec<Arc<FakeAdminApp>>>,
}

impl FakeLauncher {
    pub fn new(options: AppOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            launch_error: None,
            apps: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            options: AppOptions::default(),
            launch_error: Some(message.to_string()),
            apps: Mutex::new(Vec::new()),
        })
    }

    pub fn apps(&self) -> Vec<Arc<FakeAdminApp>> {
        self.apps.lock().unwrap().clone()
    }

    pub fn launched(&self) -> usize {
        self.apps.lock().unwrap().len()
    }

    pub fn closed(&self) -> usize {
        self.apps().iter().filter(|app| app.is_closed()).count()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn PageBackend>> {
        if let Some(message) = &self.launch_error {
            anyhow::bail!("{}", message);
        }
        let app = FakeAdminApp::new(self.options.clone());
        self.apps.lock().unwrap().push(app.clone());
        Ok(Box::new(FakePage(app)))
    }
}

/// Session config against the simulated app with a `timeout_ms` budget
pub fn session_config(timeout_ms: u64) -> SessionConfig {
    SessionConfig::new(BASE_URL)
        .unwrap()
        .with_wait(WaitOptions::default().with_timeout(Duration::from_millis(timeout_ms)))
}
