//! In-process stand-ins for the items backend and the browser.
//!
//! `FakeBackend` serves the items REST API with axum. `FakeLauncher` opens
//! pages that render the login, dashboard and items views from the same
//! store, so seeding through the API is visible in the "UI".

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};

use itemsearch_e2e::browser::{BrowserLauncher, BrowserPage, PageElement};
use itemsearch_e2e::config::{ApiConfig, Credentials, HarnessConfig, Selectors, Timeouts, ViewportPolicy};
use itemsearch_e2e::{E2eError, E2eResult, Locator};

pub const EMAIL: &str = "qa@example.test";
pub const PASSWORD: &str = "correct horse";
pub const APP_URL: &str = "http://app.test";

// ============================================================================
// Items REST backend
// ============================================================================

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    items: Vec<(u64, Value)>,
    fail_deletes: HashSet<u64>,
    fail_creates: bool,
    ignore_deletes: bool,
    delete_attempts: usize,
    tokens_seen: Vec<Option<String>>,
}

/// Backend item collection shared by the REST fake and the fake UI
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    pub fn items(&self) -> Vec<Value> {
        let inner = self.inner.lock().unwrap();
        inner.items.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.items.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn insert(&self, body: Value) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.push((id, body));
        id
    }

    pub fn fail_delete_of(&self, id: u64) {
        self.inner.lock().unwrap().fail_deletes.insert(id);
    }

    pub fn fail_creates(&self) {
        self.inner.lock().unwrap().fail_creates = true;
    }

    /// Acknowledge deletes without removing anything
    pub fn ignore_deletes(&self) {
        self.inner.lock().unwrap().ignore_deletes = true;
    }

    pub fn delete_attempts(&self) -> usize {
        self.inner.lock().unwrap().delete_attempts
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.inner.lock().unwrap().tokens_seen.clone()
    }

    fn note_token(&self, headers: &axum::http::HeaderMap) {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start_matches("Bearer ").to_string());
        self.inner.lock().unwrap().tokens_seen.push(token);
    }
}

pub struct FakeBackend {
    pub store: Store,
    pub api_url: String,
    task: tokio::task::JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let store = Store::default();
        let app = Router::new()
            .route("/api/items", get(list_items).post(create_item))
            .route("/api/items/:id", delete(delete_item))
            .with_state(store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            store,
            api_url: format!("http://127.0.0.1:{}/api", port),
            task,
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            token: Some("test-token".to_string()),
            request_timeout_ms: 2_000,
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_items(State(store): State<Store>, headers: axum::http::HeaderMap) -> Json<Value> {
    store.note_token(&headers);
    let inner = store.inner.lock().unwrap();
    let data: Vec<Value> = inner
        .items
        .iter()
        .map(|(id, body)| {
            let mut record = body.clone();
            record["id"] = json!(id);
            record
        })
        .collect();
    Json(json!({ "data": data }))
}

async fn create_item(
    State(store): State<Store>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    store.note_token(&headers);
    if store.inner.lock().unwrap().fail_creates {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "currency not accepted" })),
        );
    }
    let id = store.insert(body);
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

async fn delete_item(State(store): State<Store>, Path(id): Path<u64>) -> StatusCode {
    let mut inner = store.inner.lock().unwrap();
    inner.delete_attempts += 1;
    if inner.fail_deletes.contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if inner.ignore_deletes {
        return StatusCode::NO_CONTENT;
    }
    match inner.items.iter().position(|(item_id, _)| *item_id == id) {
        Some(pos) => {
            inner.items.remove(pos);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

// ============================================================================
// Browser
// ============================================================================

/// Rendered strings of the fake application
#[derive(Debug, Clone)]
pub struct AppTexts {
    pub login_heading: String,
    pub dashboard_heading: String,
    pub items_headline: String,
    pub no_results: String,
    /// Shown in the user panel instead of the logged-in email
    pub user_panel: Option<String>,
}

impl Default for AppTexts {
    fn default() -> Self {
        let expected = itemsearch_e2e::config::Expectations::default();
        Self {
            login_heading: expected.login_heading,
            dashboard_heading: expected.dashboard_heading,
            items_headline: expected.items_headline,
            no_results: expected.no_results,
            user_panel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Blank,
    Login,
    Dashboard,
    Items,
}

#[derive(Debug, Clone)]
enum Filter {
    Name(String),
    Price(f64, f64),
}

struct PageState {
    view: View,
    logged_in_as: Option<String>,
    fields: HashMap<&'static str, String>,
    panel_open: bool,
    filter: Option<Filter>,
    /// Submitted filter and when its results replace the current document
    pending: Option<(Option<Filter>, Instant)>,
    /// Bumped whenever the document is replaced
    generation: u64,
}

impl PageState {
    fn new() -> Self {
        Self {
            view: View::Blank,
            logged_in_as: None,
            fields: HashMap::new(),
            panel_open: false,
            filter: None,
            pending: None,
            generation: 0,
        }
    }

    /// Render submitted results once they are due. Until then the previous
    /// document, rows included, stays on screen.
    fn settle(&mut self) {
        let due = matches!(&self.pending, Some((_, at)) if Instant::now() >= *at);
        if due {
            if let Some((filter, _)) = self.pending.take() {
                self.filter = filter;
                self.generation += 1;
            }
        }
    }
}

/// Launches fake pages over `store`, counting opens and closes
#[derive(Clone)]
pub struct FakeLauncher {
    pub store: Store,
    pub texts: AppTexts,
    /// Delay between a search submit and its results rendering
    pub results_delay: Duration,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub toggle_clicks: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            texts: AppTexts::default(),
            results_delay: Duration::ZERO,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            toggle_clicks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn toggle_clicks(&self) -> usize {
        self.toggle_clicks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Page = FakePage;

    async fn launch(&self, _viewport: &ViewportPolicy) -> E2eResult<FakePage> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            app: Arc::new(App {
                launcher: self.clone(),
                selectors: Selectors::default(),
                state: Mutex::new(PageState::new()),
            }),
            closed: false,
        })
    }
}

struct App {
    launcher: FakeLauncher,
    selectors: Selectors,
    state: Mutex<PageState>,
}

pub struct FakePage {
    app: Arc<App>,
    closed: bool,
}

#[derive(Debug, Clone)]
enum Kind {
    Text(String),
    Input(&'static str),
    LoginButton,
    Toggle,
    SearchButton,
    Panel(bool),
    Table(String),
}

pub struct FakeElement {
    app: Arc<App>,
    kind: Kind,
    generation: u64,
}

impl App {
    fn rows(&self, state: &PageState) -> Vec<(String, String)> {
        let mut rows = Vec::new();
        for item in self.launcher.store.items() {
            let name = item["name"].as_str().unwrap_or_default().to_string();
            let price = item["price"].as_f64().unwrap_or_default();
            let unit = item["quantity_unit"].as_str().unwrap_or_default();
            let currency = item["currency"].as_str().unwrap_or_default();
            let keep = match &state.filter {
                None => true,
                Some(Filter::Name(text)) => name.to_lowercase().contains(&text.to_lowercase()),
                Some(Filter::Price(min, max)) => price >= *min && price <= *max,
            };
            if keep {
                let label = format!("{} ({:.2} {})", name, price, unit);
                let line = format!("{} {:.2} {}", label, price, currency);
                rows.push((label, line));
            }
        }
        rows
    }

    /// Elements matching `locator` in the current document, with its generation
    fn resolve(&self, locator: &Locator) -> (u64, Vec<Kind>) {
        let s = &self.selectors;
        let mut state = self.state.lock().unwrap();
        state.settle();
        let texts = &self.launcher.texts;
        let is = |candidate: &Locator| locator.same_target(candidate);

        let kinds = match state.view {
            View::Blank => vec![],
            View::Login => {
                if is(&s.login_heading) {
                    vec![Kind::Text(texts.login_heading.clone())]
                } else if is(&s.username) {
                    vec![Kind::Input("username")]
                } else if is(&s.password) {
                    vec![Kind::Input("password")]
                } else if is(&s.login_submit) {
                    vec![Kind::LoginButton]
                } else {
                    vec![]
                }
            }
            View::Dashboard | View::Items if is(&s.user_panel) => {
                let shown = texts.user_panel.clone().or_else(|| state.logged_in_as.clone());
                vec![Kind::Text(shown.unwrap_or_default())]
            }
            View::Dashboard => {
                if is(&s.page_headline) {
                    vec![Kind::Text(texts.dashboard_heading.clone())]
                } else {
                    vec![]
                }
            }
            View::Items => {
                if is(&s.page_headline) {
                    vec![Kind::Text(texts.items_headline.clone())]
                } else if is(&s.search_toggle) {
                    vec![Kind::Toggle]
                } else if is(&s.search_panel) {
                    vec![Kind::Panel(state.panel_open)]
                } else if state.panel_open && is(&s.name_filter) {
                    vec![Kind::Input("nm")]
                } else if state.panel_open && is(&s.price_from) {
                    vec![Kind::Input("pr1")]
                } else if state.panel_open && is(&s.price_to) {
                    vec![Kind::Input("pr2")]
                } else if state.panel_open && is(&s.submit_search) {
                    vec![Kind::SearchButton]
                } else if is(&s.results_table) {
                    let rows = self.rows(&state);
                    let mut text = "Артикул Цена".to_string();
                    for (_, line) in rows {
                        text.push('\n');
                        text.push_str(&line);
                    }
                    vec![Kind::Table(text)]
                } else if is(&s.result_rows) {
                    self.rows(&state)
                        .into_iter()
                        .map(|(label, _)| Kind::Text(label))
                        .collect()
                } else if is(&s.empty_state) && self.rows(&state).is_empty() {
                    vec![Kind::Text(texts.no_results.clone())]
                } else {
                    vec![]
                }
            }
        };
        (state.generation, kinds)
    }

    fn is_current(&self, generation: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        state.settle();
        state.generation == generation
    }

    fn navigate(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.fields.clear();
        state.panel_open = false;
        state.filter = None;
        state.pending = None;

        let root = url.trim_end_matches('/') == APP_URL;
        let view = match (state.logged_in_as.is_some(), root) {
            (false, _) => View::Login,
            (true, true) => View::Dashboard,
            (true, false) if url.ends_with("/objects/manage") => View::Items,
            (true, false) => View::Blank,
        };
        state.view = view;
    }
}

impl FakePage {
    fn element(&self, generation: u64, kind: Kind) -> FakeElement {
        FakeElement {
            app: self.app.clone(),
            kind,
            generation,
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.app.navigate(url);
        Ok(())
    }

    async fn query(&self, locator: &Locator) -> E2eResult<Option<FakeElement>> {
        let (generation, kinds) = self.app.resolve(locator);
        Ok(kinds.into_iter().next().map(|k| self.element(generation, k)))
    }

    async fn query_all(&self, locator: &Locator) -> E2eResult<Vec<FakeElement>> {
        let (generation, kinds) = self.app.resolve(locator);
        Ok(kinds
            .into_iter()
            .map(|k| self.element(generation, k))
            .collect())
    }

    async fn wait_for_navigation(&self) -> E2eResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if !self.closed {
            self.closed = true;
            self.app.launcher.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn click(&self) -> E2eResult<()> {
        let mut state = self.app.state.lock().unwrap();
        match &self.kind {
            Kind::LoginButton => {
                let user = state.fields.get("username").cloned().unwrap_or_default();
                let pass = state.fields.get("password").cloned().unwrap_or_default();
                if user == EMAIL && pass == PASSWORD {
                    state.logged_in_as = Some(user);
                    state.view = View::Dashboard;
                    state.generation += 1;
                }
                state.fields.clear();
            }
            Kind::Toggle => {
                self.app.launcher.toggle_clicks.fetch_add(1, Ordering::SeqCst);
                state.panel_open = !state.panel_open;
            }
            Kind::SearchButton => {
                let field = |k: &str| state.fields.get(k).cloned().unwrap_or_default();
                let (name, min, max) = (field("nm"), field("pr1"), field("pr2"));
                let filter = if !min.is_empty() || !max.is_empty() {
                    let min = min.parse().unwrap_or(0.0);
                    let max = max.parse().unwrap_or(f64::MAX);
                    Some(Filter::Price(min, max))
                } else if !name.is_empty() {
                    Some(Filter::Name(name))
                } else {
                    None
                };
                let due = Instant::now() + self.app.launcher.results_delay;
                state.pending = Some((filter, due));
            }
            other => {
                return Err(E2eError::Browser(format!("{:?} is not clickable", other)));
            }
        }
        Ok(())
    }

    async fn clear(&self) -> E2eResult<()> {
        if let Kind::Input(key) = self.kind {
            self.app.state.lock().unwrap().fields.insert(key, String::new());
        }
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> E2eResult<()> {
        match self.kind {
            Kind::Input(key) => {
                let mut state = self.app.state.lock().unwrap();
                state.fields.entry(key).or_default().push_str(text);
                Ok(())
            }
            _ => Err(E2eError::Browser("element is not editable".to_string())),
        }
    }

    async fn text(&self) -> E2eResult<String> {
        Ok(match &self.kind {
            Kind::Text(text) | Kind::Table(text) => text.clone(),
            Kind::Input(key) => self
                .app
                .state
                .lock()
                .unwrap()
                .fields
                .get(key)
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        })
    }

    async fn is_displayed(&self) -> E2eResult<bool> {
        Ok(!matches!(self.kind, Kind::Panel(false)))
    }

    async fn is_attached(&self) -> E2eResult<bool> {
        Ok(self.app.is_current(self.generation))
    }

    async fn height(&self) -> E2eResult<f64> {
        Ok(match self.kind {
            Kind::SearchButton => 24.0,
            _ => 18.0,
        })
    }
}

// ============================================================================
// Config
// ============================================================================

pub fn test_config(api: ApiConfig) -> HarnessConfig {
    HarnessConfig {
        base_url: APP_URL.to_string(),
        api,
        credentials: Credentials::new(EMAIL, PASSWORD),
        timeouts: Timeouts {
            default_wait_ms: 150,
            result_wait_ms: 600,
            poll_interval_ms: 10,
        },
        ..Default::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
