//! Items view search protocol and result assertions
//!
//! ```text
//! PanelCollapsed --expand--> PanelExpanded --fill--> Filtered --submit--> EmptyResult
//!                                  ^                                  \-> NonEmptyResult
//!                                  \------------- expand -------------------/
//! ```
//!
//! Transitions only happen on explicit actions. Opening the items view puts
//! the verifier back at `PanelCollapsed` because it loads a fresh page.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::browser::{BrowserPage, PageElement};
use crate::config::{Expectations, HarnessConfig, Selectors};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    PanelCollapsed,
    PanelExpanded,
    Filtered,
    EmptyResult,
    NonEmptyResult,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the results area showed after a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSnapshot {
    /// The empty-state element, with its displayed message
    Empty { message: String },

    /// Item link text per row in display order, plus the whole table text
    Rows { rows: Vec<String>, table_text: String },
}

impl ResultSnapshot {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultSnapshot::Empty { .. })
    }

    pub fn row_count(&self) -> usize {
        match self {
            ResultSnapshot::Empty { .. } => 0,
            ResultSnapshot::Rows { rows, .. } => rows.len(),
        }
    }

    /// Everything the results area displayed, as one string
    pub fn aggregated_text(&self) -> &str {
        match self {
            ResultSnapshot::Empty { message } => message,
            ResultSnapshot::Rows { table_text, .. } => table_text,
        }
    }
}

/// Drives the search panel of the items view within one session
pub struct SearchVerifier<'s, P: BrowserPage> {
    session: &'s Session<P>,
    selectors: Selectors,
    expectations: Expectations,
    items_url: String,
    result_wait: Duration,
    state: SearchState,
}

impl<'s, P: BrowserPage> SearchVerifier<'s, P> {
    pub fn new(session: &'s Session<P>, config: &HarnessConfig) -> Self {
        Self {
            session,
            selectors: config.selectors.clone(),
            expectations: config.expectations.clone(),
            items_url: config.items_url(),
            result_wait: config.timeouts.result_wait(),
            state: SearchState::PanelCollapsed,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Navigate to the items-management view
    pub async fn open_items_view(&mut self) -> E2eResult<()> {
        self.session.page()?.goto(&self.items_url).await?;
        self.state = SearchState::PanelCollapsed;
        debug!("Opened items view {}", self.items_url);
        Ok(())
    }

    /// Headline text matches and the results table is displayed
    pub async fn assert_items_view(&self) -> E2eResult<()> {
        let page = self.session.page()?;
        let waiter = self.session.waiter();

        let headline = waiter.find(page, &self.selectors.page_headline).await?.text().await?;
        expect_eq("items headline", &self.expectations.items_headline, &headline)?;

        let table = waiter.find(page, &self.selectors.results_table).await?;
        if !table.is_displayed().await? {
            return Err(E2eError::assertion(
                "results table visibility",
                "displayed",
                "hidden",
            ));
        }
        Ok(())
    }

    /// Make sure the search panel is open. A no-op when it already is.
    pub async fn expand_search_panel(&mut self) -> E2eResult<()> {
        let page = self.session.page()?;
        let waiter = self.session.waiter();

        let already_open = match page.query(&self.selectors.search_panel).await? {
            Some(panel) => panel.is_displayed().await?,
            None => false,
        };

        if already_open {
            debug!("Search panel already expanded");
        } else {
            waiter.find(page, &self.selectors.search_toggle).await?.click().await?;
            // The panel must actually open before filters can be used
            let panel = waiter.find(page, &self.selectors.search_panel).await?;
            if !panel.is_displayed().await? {
                return Err(E2eError::Timeout(format!(
                    "search panel {} did not expand",
                    self.selectors.search_panel
                )));
            }
        }

        self.state = SearchState::PanelExpanded;
        Ok(())
    }

    /// Filter by item name and capture the result area
    pub async fn search_by_name(&mut self, text: &str) -> E2eResult<ResultSnapshot> {
        self.require(SearchState::PanelExpanded, "search_by_name")?;
        info!("Searching items by name {:?}", text);

        let page = self.session.page()?;
        let field = self.session.waiter().find(page, &self.selectors.name_filter).await?;
        field.clear().await?;
        field.send_keys(text).await?;
        self.state = SearchState::Filtered;

        let timeout = self.session.waiter().default_timeout();
        self.submit(timeout).await
    }

    /// Filter by price bounds (same filter row) and capture the result area,
    /// allowing the backend time to recompute the result set
    pub async fn search_by_price_range(&mut self, min: f64, max: f64) -> E2eResult<ResultSnapshot> {
        self.require(SearchState::PanelExpanded, "search_by_price_range")?;
        if min.is_nan() || max.is_nan() || min > max {
            return Err(E2eError::InvalidSearch(format!(
                "price range lower bound {} exceeds upper bound {}",
                min, max
            )));
        }
        info!("Searching items by price {}..{}", min, max);

        let page = self.session.page()?;
        let waiter = self.session.waiter();

        let from = waiter.find(page, &self.selectors.price_from).await?;
        from.clear().await?;
        from.send_keys(&format_bound(min)).await?;

        let to = waiter.find(page, &self.selectors.price_to).await?;
        to.clear().await?;
        to.send_keys(&format_bound(max)).await?;
        self.state = SearchState::Filtered;

        self.submit(self.result_wait).await
    }

    /// Read the result area as it stands, without searching
    pub async fn current_snapshot(&self) -> E2eResult<ResultSnapshot> {
        self.capture(self.session.waiter().default_timeout()).await
    }

    pub fn assert_empty_result(&self, snapshot: &ResultSnapshot) -> E2eResult<()> {
        match snapshot {
            ResultSnapshot::Empty { message } => {
                expect_eq("empty-state message", &self.expectations.no_results, message)
            }
            ResultSnapshot::Rows { rows, .. } => Err(E2eError::assertion(
                "result rows",
                "empty-state",
                format!("{} row(s): {}", rows.len(), rows.join(", ")),
            )),
        }
    }

    pub fn assert_contains_name(&self, snapshot: &ResultSnapshot, name: &str) -> E2eResult<()> {
        match snapshot {
            ResultSnapshot::Rows { table_text, .. } if table_text.contains(name) => Ok(()),
            ResultSnapshot::Rows { table_text, .. } => Err(E2eError::assertion(
                "results text",
                format!("contains {:?}", name),
                table_text.clone(),
            )),
            ResultSnapshot::Empty { message } => Err(E2eError::assertion(
                "results text",
                format!("contains {:?}", name),
                format!("empty-state: {}", message),
            )),
        }
    }

    /// Exactly one row, whose item text equals `expected`
    pub fn assert_single_row(&self, snapshot: &ResultSnapshot, expected: &str) -> E2eResult<()> {
        match snapshot {
            ResultSnapshot::Rows { rows, .. } if rows.len() == 1 => {
                expect_eq("single result row", expected, &rows[0])
            }
            ResultSnapshot::Rows { rows, .. } => Err(E2eError::assertion(
                "result row count",
                format!("1 row: {}", expected),
                format!("{} row(s): {}", rows.len(), rows.join(", ")),
            )),
            ResultSnapshot::Empty { message } => Err(E2eError::assertion(
                "result row count",
                format!("1 row: {}", expected),
                format!("empty-state: {}", message),
            )),
        }
    }

    /// Rendered height of the submit-search control, in whole pixels
    pub async fn assert_submit_height(&self, expected_px: u32) -> E2eResult<()> {
        let page = self.session.page()?;
        let button = self.session.waiter().find(page, &self.selectors.submit_search).await?;
        let height = button.height().await?.round() as u32;
        debug!("Submit control height: {}px", height);
        expect_eq("submit control height", &expected_px.to_string(), &height.to_string())
    }

    /// Submit the filter and capture the re-rendered result area.
    ///
    /// The pre-submit results table stays displayed until the application
    /// answers, so it must leave the document before rows are read. Both the
    /// refresh and the capture share the one `timeout`.
    async fn submit(&mut self, timeout: Duration) -> E2eResult<ResultSnapshot> {
        self.require(SearchState::Filtered, "submit")?;

        let start = Instant::now();
        let page = self.session.page()?;
        let waiter = self.session.waiter();
        let previous = self.result_area(page).await?;

        waiter
            .find(page, &self.selectors.submit_search)
            .await?
            .click()
            .await?;
        page.wait_for_navigation().await?;

        if let Some((locator, element)) = &previous {
            waiter.wait_detached(element, locator, timeout).await?;
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        let snapshot = self.capture(remaining).await?;
        self.state = if snapshot.is_empty() {
            SearchState::EmptyResult
        } else {
            SearchState::NonEmptyResult
        };
        info!("Search returned {} row(s)", snapshot.row_count());
        Ok(snapshot)
    }

    /// Whatever currently stands for the results: the table, else the
    /// empty-state message
    async fn result_area(&self, page: &P) -> E2eResult<Option<(Locator, P::Element)>> {
        for locator in [&self.selectors.results_table, &self.selectors.empty_state] {
            if let Some(element) = page.query(locator).await? {
                return Ok(Some((locator.clone(), element)));
            }
        }
        Ok(None)
    }

    async fn capture(&self, timeout: Duration) -> E2eResult<ResultSnapshot> {
        let page = self.session.page()?;
        let waiter = self.session.waiter();
        let candidates = [&self.selectors.empty_state, &self.selectors.result_rows];

        let (winner, element) = waiter.find_first_displayed(page, &candidates, timeout).await?;
        if winner == 0 {
            return Ok(ResultSnapshot::Empty {
                message: element.text().await?,
            });
        }

        let mut rows = Vec::new();
        for row in page.query_all(&self.selectors.result_rows).await? {
            rows.push(row.text().await?);
        }
        let table_text = waiter.find(page, &self.selectors.results_table).await?.text().await?;

        Ok(ResultSnapshot::Rows { rows, table_text })
    }

    fn require(&self, expected: SearchState, action: &str) -> E2eResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(E2eError::InvalidTransition {
                action: action.to_string(),
                from: self.state.to_string(),
            })
        }
    }
}

fn expect_eq(what: &str, expected: &str, actual: &str) -> E2eResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(E2eError::assertion(what, expected, actual))
    }
}

/// Bounds are typed as the user would: no trailing ".0" on whole numbers
fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
