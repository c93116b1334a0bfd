//! Declarative YAML scenarios

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::fixture::Item;

/// One seed → act → assert → teardown case parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Empty the backend item collection before seeding
    #[serde(default)]
    pub reset: bool,

    /// Items created through the API, in order, before the browser opens
    #[serde(default)]
    pub seed: Vec<Item>,

    /// Steps to execute in order after login
    pub steps: Vec<ScenarioStep>,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Navigate to the items-management view
    OpenItemsView,

    /// Check the items headline and results table
    AssertItemsView,

    ExpandSearchPanel,

    SearchByName { text: String },

    SearchByPriceRange { min: f64, max: f64 },

    /// Capture the result area without searching
    ObserveResults,

    /// Last captured results show the "no results" empty state
    AssertEmpty,

    /// Last captured results contain this text
    AssertContains { text: String },

    /// Last captured results are exactly one row with this item text
    AssertSingleRow { text: String },

    AssertSubmitHeight { px: u32 },
}

impl ScenarioStep {
    /// True for steps that inspect the last captured results
    pub fn needs_snapshot(&self) -> bool {
        matches!(
            self,
            ScenarioStep::AssertEmpty
                | ScenarioStep::AssertContains { .. }
                | ScenarioStep::AssertSingleRow { .. }
        )
    }
}

impl fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioStep::OpenItemsView => write!(f, "open_items_view"),
            ScenarioStep::AssertItemsView => write!(f, "assert_items_view"),
            ScenarioStep::ExpandSearchPanel => write!(f, "expand_search_panel"),
            ScenarioStep::SearchByName { text } => write!(f, "search_by_name:{}", text),
            ScenarioStep::SearchByPriceRange { min, max } => {
                write!(f, "search_by_price_range:{}..{}", min, max)
            }
            ScenarioStep::ObserveResults => write!(f, "observe_results"),
            ScenarioStep::AssertEmpty => write!(f, "assert_empty"),
            ScenarioStep::AssertContains { text } => write!(f, "assert_contains:{}", text),
            ScenarioStep::AssertSingleRow { text } => write!(f, "assert_single_row:{}", text),
            ScenarioStep::AssertSubmitHeight { px } => write!(f, "assert_submit_height:{}", px),
        }
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = scenarios.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(E2eError::ScenarioParse(format!(
                "duplicate scenario name: {}",
                pair[0].name
            )));
        }
        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Reject step sequences that can never pass: result assertions with
    /// nothing captured yet, and unusable seed items.
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::ScenarioParse("scenario name is empty".to_string()));
        }
        for item in &self.seed {
            item.validate()
                .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", self.name, e)))?;
        }

        let mut captured = false;
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                ScenarioStep::SearchByPriceRange { min, max }
                    if min.is_nan() || max.is_nan() || min > max =>
                {
                    return Err(E2eError::ScenarioParse(format!(
                        "{}: step {} ({}) has an empty price range",
                        self.name,
                        i + 1,
                        step
                    )));
                }
                ScenarioStep::SearchByName { .. }
                | ScenarioStep::SearchByPriceRange { .. }
                | ScenarioStep::ObserveResults => captured = true,
                ScenarioStep::OpenItemsView => captured = false,
                s if s.needs_snapshot() && !captured => {
                    return Err(E2eError::ScenarioParse(format!(
                        "{}: step {} ({}) has no captured results to check",
                        self.name,
                        i + 1,
                        s
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
