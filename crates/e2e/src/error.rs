//! Error types for the item search harness
//!
//! Every variant is fatal to the scenario it occurs in. Nothing here is
//! retried or recovered locally; the orchestrator only guarantees teardown.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("API {operation} failed with status {status}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("API delete-all removed {deleted} of {total} item(s); {failed} deletion(s) failed")]
    PartialDelete {
        deleted: usize,
        failed: usize,
        total: usize,
    },

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Element not found: {locator} (waited {timeout_ms} ms)")]
    ElementNotFound { locator: String, timeout_ms: u64 },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Assertion failed: {what}: expected {expected:?}, got {actual:?}")]
    AssertionFailed {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid search input: {0}")]
    InvalidSearch(String),

    #[error("Invalid search transition: {action} from {from}")]
    InvalidTransition { action: String, from: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    pub fn element_not_found(locator: impl ToString, timeout: Duration) -> Self {
        E2eError::ElementNotFound {
            locator: locator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn assertion(
        what: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        E2eError::AssertionFailed {
            what: what.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Seeding or reset failed; UI checks over unknown data are meaningless.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            E2eError::Api { .. } | E2eError::PartialDelete { .. } | E2eError::Http(_)
        )
    }

    pub fn is_login_error(&self) -> bool {
        matches!(self, E2eError::Login(_))
    }

    pub fn is_element_not_found(&self) -> bool {
        matches!(self, E2eError::ElementNotFound { .. } | E2eError::Timeout(_))
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, E2eError::AssertionFailed { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for E2eError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        E2eError::Browser(e.to_string())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
