//! Scenario orchestration: seed → open+login → act/assert → close
//!
//! The session is closed on every exit path of a scenario, whatever step
//! failed. A close failure only decides the outcome when nothing else did.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::fixture::{FixtureClient, Item};
use crate::scenario::{Scenario, ScenarioStep};
use crate::search::{ResultSnapshot, SearchVerifier};
use crate::session::{Session, SessionDriver};

/// Outcome of one step of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario. Pass or fail, nothing in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// The step that decided a failed scenario
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Result of running several scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Runs scenarios against one deployment
pub struct TestOrchestrator<L: BrowserLauncher> {
    config: HarnessConfig,
    fixtures: FixtureClient,
    driver: SessionDriver<L>,
}

impl TestOrchestrator<ChromeLauncher> {
    /// Orchestrator driving a local Chrome
    pub fn chrome(config: HarnessConfig) -> E2eResult<Self> {
        Self::new(config, ChromeLauncher::default())
    }
}

impl<L: BrowserLauncher> TestOrchestrator<L> {
    pub fn new(config: HarnessConfig, launcher: L) -> E2eResult<Self> {
        config.validate()?;
        let fixtures = FixtureClient::new(&config.api)?;
        let driver = SessionDriver::new(launcher, &config);
        Ok(Self {
            config,
            fixtures,
            driver,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn fixtures(&self) -> &FixtureClient {
        &self.fixtures
    }

    /// Run a hand-written scenario body with the same guarantees as
    /// [`run_scenario`](Self::run_scenario): optional reset, seeding, a fresh
    /// logged-in session, and an unconditional close afterwards.
    pub async fn run_with<T, F>(&self, reset: bool, seed: &[Item], body: F) -> E2eResult<T>
    where
        F: for<'a> FnOnce(&'a mut SearchVerifier<'a, L::Page>) -> LocalBoxFuture<'a, E2eResult<T>>,
    {
        self.seed(reset, seed).await?;

        let mut session = self.open().await?;
        let outcome = match self.driver.login(&session, &self.config.credentials).await {
            Ok(()) => {
                let mut verifier = SearchVerifier::new(&session, &self.config);
                body(&mut verifier).await
            }
            Err(e) => Err(e),
        };
        let closed = session.close().await;

        settle(outcome, closed)
    }

    /// Run one declarative scenario, recording every step
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let mut steps = Vec::new();
        debug!("Running scenario: {}", scenario.name);

        let outcome = self.execute(scenario, &mut steps).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let error = outcome.err().map(|e| e.to_string());
        match &error {
            None => info!("✓ {} ({} ms)", scenario.name, duration_ms),
            Some(e) => error!("✗ {} - {}", scenario.name, e),
        }

        ScenarioResult {
            name: scenario.name.clone(),
            success: error.is_none(),
            duration_ms,
            steps,
            error,
        }
    }

    /// Run scenarios one after another.
    ///
    /// They share the backend item collection, so they are never run
    /// concurrently from one orchestrator.
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        info!("Running {} scenario(s)...", scenarios.len());
        for scenario in scenarios {
            results.push(self.run_scenario(scenario).await);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            started_at,
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run every scenario file under `dir`
    pub async fn run_all(&self, dir: &Path) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run the scenario files under `dir` carrying `tag`
    pub async fn run_tagged(&self, dir: &Path, tag: &str) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(dir)?;
        let selected: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&selected).await)
    }

    /// Write suite results to `test-results.json` in the results directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.results_dir)?;

        let path = self.config.results_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    async fn execute(&self, scenario: &Scenario, steps: &mut Vec<StepRecord>) -> E2eResult<()> {
        record(steps, "seed", self.seed(scenario.reset, &scenario.seed)).await?;

        let mut session = record(steps, "open", self.open()).await?;
        let outcome = self.drive(&session, scenario, steps).await;
        let closed = record(steps, "close", session.close()).await;

        settle(outcome, closed)
    }

    async fn drive(
        &self,
        session: &Session<L::Page>,
        scenario: &Scenario,
        steps: &mut Vec<StepRecord>,
    ) -> E2eResult<()> {
        record(
            steps,
            "login",
            self.driver.login(session, &self.config.credentials),
        )
        .await?;

        let mut verifier = SearchVerifier::new(session, &self.config);
        let mut last: Option<ResultSnapshot> = None;
        for step in &scenario.steps {
            let name = step.to_string();
            record(steps, &name, run_step(&mut verifier, step, &mut last)).await?;
        }
        Ok(())
    }

    async fn seed(&self, reset: bool, items: &[Item]) -> E2eResult<()> {
        if reset {
            self.fixtures.delete_all_items().await?;
        }
        self.fixtures.create_items(items).await?;
        Ok(())
    }

    async fn open(&self) -> E2eResult<Session<L::Page>> {
        self.driver
            .open(&self.config.base_url, &self.config.viewport)
            .await
    }
}

async fn run_step<P: crate::browser::BrowserPage>(
    verifier: &mut SearchVerifier<'_, P>,
    step: &ScenarioStep,
    last: &mut Option<ResultSnapshot>,
) -> E2eResult<()> {
    match step {
        ScenarioStep::OpenItemsView => {
            *last = None;
            verifier.open_items_view().await
        }
        ScenarioStep::AssertItemsView => verifier.assert_items_view().await,
        ScenarioStep::ExpandSearchPanel => verifier.expand_search_panel().await,
        ScenarioStep::SearchByName { text } => {
            *last = Some(verifier.search_by_name(text).await?);
            Ok(())
        }
        ScenarioStep::SearchByPriceRange { min, max } => {
            *last = Some(verifier.search_by_price_range(*min, *max).await?);
            Ok(())
        }
        ScenarioStep::ObserveResults => {
            *last = Some(verifier.current_snapshot().await?);
            Ok(())
        }
        ScenarioStep::AssertEmpty => verifier.assert_empty_result(captured(last, step)?),
        ScenarioStep::AssertContains { text } => {
            verifier.assert_contains_name(captured(last, step)?, text)
        }
        ScenarioStep::AssertSingleRow { text } => {
            verifier.assert_single_row(captured(last, step)?, text)
        }
        ScenarioStep::AssertSubmitHeight { px } => verifier.assert_submit_height(*px).await,
    }
}

fn captured<'a>(last: &'a Option<ResultSnapshot>, step: &ScenarioStep) -> E2eResult<&'a ResultSnapshot> {
    last.as_ref()
        .ok_or_else(|| E2eError::ScenarioParse(format!("{} has no captured results to check", step)))
}

/// Time `fut`, append its record, and pass its result through
async fn record<T, Fut>(steps: &mut Vec<StepRecord>, name: &str, fut: Fut) -> E2eResult<T>
where
    Fut: Future<Output = E2eResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    steps.push(StepRecord {
        step: name.to_string(),
        success: result.is_ok(),
        duration_ms: start.elapsed().as_millis() as u64,
        error: result.as_ref().err().map(|e| e.to_string()),
    });
    result
}

/// The scenario's own error wins over a teardown error
fn settle<T>(outcome: E2eResult<T>, closed: E2eResult<()>) -> E2eResult<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Session close also failed: {}", close_err);
            Err(e)
        }
    }
}
