//! Element locators
//!
//! Every UI lookup in the harness goes through a [`Locator`], so the
//! verification code never handles raw selector strings directly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a locator resolves its element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Id(String),
    Name(String),
    Css(String),
    XPath(String),
}

/// A strategy plus an optional per-locator wait override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocatorRepr", into = "LocatorRepr")]
pub struct Locator {
    pub strategy: Strategy,
    pub timeout_ms: Option<u64>,
}

/// File form: `{ by: id|name|css|xpath, value: ..., timeout_ms: ... }`
#[derive(Serialize, Deserialize)]
struct LocatorRepr {
    by: StrategyKind,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StrategyKind {
    Id,
    Name,
    Css,
    Xpath,
}

impl From<LocatorRepr> for Locator {
    fn from(repr: LocatorRepr) -> Self {
        let strategy = match repr.by {
            StrategyKind::Id => Strategy::Id(repr.value),
            StrategyKind::Name => Strategy::Name(repr.value),
            StrategyKind::Css => Strategy::Css(repr.value),
            StrategyKind::Xpath => Strategy::XPath(repr.value),
        };
        Locator {
            strategy,
            timeout_ms: repr.timeout_ms,
        }
    }
}

impl From<Locator> for LocatorRepr {
    fn from(locator: Locator) -> Self {
        let (by, value) = match locator.strategy {
            Strategy::Id(v) => (StrategyKind::Id, v),
            Strategy::Name(v) => (StrategyKind::Name, v),
            Strategy::Css(v) => (StrategyKind::Css, v),
            Strategy::XPath(v) => (StrategyKind::Xpath, v),
        };
        LocatorRepr {
            by,
            value,
            timeout_ms: locator.timeout_ms,
        }
    }
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Self::from_strategy(Strategy::Id(id.into()))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::from_strategy(Strategy::Name(name.into()))
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_strategy(Strategy::Css(selector.into()))
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        Self::from_strategy(Strategy::XPath(path.into()))
    }

    fn from_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            timeout_ms: None,
        }
    }

    /// Override the waiter's default timeout for this locator
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Render as a CSS selector. XPath locators have no CSS form.
    pub fn to_css(&self) -> Option<String> {
        match &self.strategy {
            Strategy::Id(id) => Some(format!("[id=\"{}\"]", escape_attr(id))),
            Strategy::Name(name) => Some(format!("[name=\"{}\"]", escape_attr(name))),
            Strategy::Css(selector) => Some(selector.clone()),
            Strategy::XPath(_) => None,
        }
    }

    /// True when both locators address the same element, ignoring timeouts
    pub fn same_target(&self, other: &Locator) -> bool {
        self.strategy == other.strategy
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strategy {
            Strategy::Id(v) => write!(f, "id={}", v),
            Strategy::Name(v) => write!(f, "name={}", v),
            Strategy::Css(v) => write!(f, "css={}", v),
            Strategy::XPath(v) => write!(f, "xpath={}", v),
        }
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
