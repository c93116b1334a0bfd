//! Harness configuration
//!
//! Defaults carry the authoritative locale strings and the fixed page
//! locators of the items application. Deployment-specific values (hosts,
//! credentials, token) come from a YAML file and/or `ITEMSEARCH_*` variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

/// Complete configuration for one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL of the web application (login view)
    pub base_url: String,

    /// Path of the items-management view, relative to `base_url`
    pub items_path: String,

    pub api: ApiConfig,
    pub credentials: Credentials,
    pub viewport: ViewportPolicy,
    pub timeouts: Timeouts,
    pub expectations: Expectations,
    pub selectors: Selectors,

    /// Where suite results are written
    pub results_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            items_path: "/objects/manage".to_string(),
            api: ApiConfig::default(),
            credentials: Credentials::default(),
            viewport: ViewportPolicy::default(),
            timeouts: Timeouts::default(),
            expectations: Expectations::default(),
            selectors: Selectors::default(),
            results_dir: PathBuf::from("test-results"),
        }
    }
}

/// REST endpoint used for fixtures. Host and auth are provisioned externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Sent as a bearer token when present
    #[serde(skip_serializing)]
    pub token: Option<String>,

    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            token: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Login credentials for the test account
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Browser window policy for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewportPolicy {
    Maximized {
        #[serde(default = "default_headless")]
        headless: bool,
    },
    Fixed {
        width: u32,
        height: u32,
        #[serde(default = "default_headless")]
        headless: bool,
    },
}

fn default_headless() -> bool {
    true
}

impl ViewportPolicy {
    pub fn headless(&self) -> bool {
        match self {
            ViewportPolicy::Maximized { headless } | ViewportPolicy::Fixed { headless, .. } => {
                *headless
            }
        }
    }

    pub fn with_headless(self, headless: bool) -> Self {
        match self {
            ViewportPolicy::Maximized { .. } => ViewportPolicy::Maximized { headless },
            ViewportPolicy::Fixed { width, height, .. } => ViewportPolicy::Fixed {
                width,
                height,
                headless,
            },
        }
    }
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        ViewportPolicy::Maximized { headless: true }
    }
}

/// Element wait bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Floor for every interactive lookup
    pub default_wait_ms: u64,

    /// Lookups that follow a server-side recomputation of the result set
    pub result_wait_ms: u64,

    pub poll_interval_ms: u64,
}

impl Timeouts {
    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn result_wait(&self) -> Duration {
        Duration::from_millis(self.result_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_wait_ms: 5_000,
            result_wait_ms: 15_000,
            poll_interval_ms: 100,
        }
    }
}

/// Literal UI strings, compared exactly. Never substitute translations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectations {
    pub login_heading: String,
    pub dashboard_heading: String,
    pub items_headline: String,
    pub no_results: String,
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            login_heading: "Вход в inv.bg".to_string(),
            dashboard_heading: "Система за фактуриране".to_string(),
            items_headline: "Артикули".to_string(),
            no_results: "Не са намерени артикули, отговарящи на зададените критерии."
                .to_string(),
        }
    }
}

/// Locators for every element the harness touches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login_heading: Locator,
    pub username: Locator,
    pub password: Locator,
    pub login_submit: Locator,
    pub page_headline: Locator,
    pub user_panel: Locator,
    pub results_table: Locator,
    /// Item link inside each result row
    pub result_rows: Locator,
    pub empty_state: Locator,
    pub search_toggle: Locator,
    /// Container that is only displayed while the search panel is expanded
    pub search_panel: Locator,
    pub name_filter: Locator,
    pub price_from: Locator,
    pub price_to: Locator,
    pub submit_search: Locator,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            login_heading: Locator::xpath("//h1"),
            username: Locator::id("loginusername"),
            password: Locator::name("password"),
            login_submit: Locator::css("input.selenium-submit-button"),
            page_headline: Locator::xpath("//div[@id='headline']//h2"),
            user_panel: Locator::css("div.userpanel-header"),
            results_table: Locator::id("fakturi_table"),
            // Item rows start at the third body row
            result_rows: Locator::xpath("//*[@id=\"fakturi_table\"]/tbody/tr[position() > 2]/td[2]/a"),
            empty_state: Locator::id("emptylist"),
            search_toggle: Locator::id("searchbtn"),
            search_panel: Locator::id("searchbox"),
            name_filter: Locator::name("nm"),
            price_from: Locator::xpath("//*[@id=\"searchbox\"]/table/tbody/tr[2]/td[2]/input[1]"),
            price_to: Locator::xpath("//*[@id=\"searchbox\"]/table/tbody/tr[2]/td[2]/input[2]"),
            submit_search: Locator::name("s"),
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `ITEMSEARCH_*` variables
    pub fn from_env() -> E2eResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a YAML config file, then apply `ITEMSEARCH_*` overrides
    pub fn from_yaml_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> E2eResult<()> {
        if let Some(v) = env_var("ITEMSEARCH_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env_var("ITEMSEARCH_API_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = env_var("ITEMSEARCH_API_TOKEN") {
            self.api.token = Some(v);
        }
        if let Some(v) = env_var("ITEMSEARCH_EMAIL") {
            self.credentials.email = v;
        }
        if let Some(v) = env_var("ITEMSEARCH_PASSWORD") {
            self.credentials.password = v;
        }
        if let Some(v) = env_var("ITEMSEARCH_HEADLESS") {
            let headless = parse_bool("ITEMSEARCH_HEADLESS", &v)?;
            self.viewport = self.viewport.clone().with_headless(headless);
        }
        if let Some(v) = env_var("ITEMSEARCH_DEFAULT_WAIT_MS") {
            self.timeouts.default_wait_ms = parse_millis("ITEMSEARCH_DEFAULT_WAIT_MS", &v)?;
        }
        if let Some(v) = env_var("ITEMSEARCH_RESULT_WAIT_MS") {
            self.timeouts.result_wait_ms = parse_millis("ITEMSEARCH_RESULT_WAIT_MS", &v)?;
        }
        if let Some(v) = env_var("ITEMSEARCH_RESULTS_DIR") {
            self.results_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        check_url("base_url", &self.base_url)?;
        check_url("api.base_url", &self.api.base_url)?;

        if !self.items_path.starts_with('/') {
            return Err(E2eError::Config(format!(
                "items_path must start with '/': {}",
                self.items_path
            )));
        }
        if self.credentials.email.trim().is_empty() || self.credentials.password.is_empty() {
            return Err(E2eError::Config(
                "credentials are required (set ITEMSEARCH_EMAIL and ITEMSEARCH_PASSWORD)"
                    .to_string(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config("poll_interval_ms must be non-zero".to_string()));
        }
        if self.timeouts.result_wait_ms < self.timeouts.default_wait_ms {
            return Err(E2eError::Config(format!(
                "result_wait_ms ({}) is shorter than default_wait_ms ({})",
                self.timeouts.result_wait_ms, self.timeouts.default_wait_ms
            )));
        }
        Ok(())
    }

    /// Absolute URL of the items-management view
    pub fn items_url(&self) -> String {
        join_url(&self.base_url, &self.items_path)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn check_url(field: &str, url: &str) -> E2eResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(E2eError::Config(format!(
            "{} must be an http(s) URL: {:?}",
            field, url
        )))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|v| if v.trim().is_empty() { None } else { Some(v) })
}

fn parse_bool(name: &str, value: &str) -> E2eResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(E2eError::Config(format!("{} is not a boolean: {}", name, other))),
    }
}

fn parse_millis(name: &str, value: &str) -> E2eResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| E2eError::Config(format!("{} is not a millisecond count: {}", name, value)))
}
