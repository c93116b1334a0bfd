//! Item Search Acceptance Harness
//!
//! This crate verifies the item search feature of the invoicing web UI end
//! to end. Each scenario:
//! - Resets and seeds the backend item collection over REST
//! - Opens an isolated Chrome context and logs in
//! - Drives the items view search panel with bounded element waits
//! - Asserts exact locale strings and displayed rows
//! - Closes the browser whatever happened before
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TestOrchestrator (per scenario)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FixtureClient                                              │
//! │    ├── delete_all_items()                                   │
//! │    └── create_item(item) -> RecordHandle                    │
//! │  SessionDriver                                              │
//! │    ├── open(base_url, viewport) -> Session                  │
//! │    ├── login(session, credentials)                          │
//! │    └── Session::close()            (always runs)            │
//! │  SearchVerifier (on ElementWaiter)                          │
//! │    ├── expand_search_panel()                                │
//! │    ├── search_by_name(text) -> ResultSnapshot               │
//! │    ├── search_by_price_range(min, max) -> ResultSnapshot    │
//! │    └── assert_empty_result / assert_contains_name / ...     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML): reset, seed: [Item], steps: [Step]        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod fixture;
pub mod locator;
pub mod orchestrator;
pub mod scenario;
pub mod search;
pub mod session;
pub mod waiter;

pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use fixture::{Currency, FixtureClient, Item, RecordHandle};
pub use locator::Locator;
pub use orchestrator::{ScenarioResult, SuiteResult, TestOrchestrator};
pub use scenario::{Scenario, ScenarioStep};
pub use search::{ResultSnapshot, SearchState, SearchVerifier};
pub use session::{Session, SessionDriver};
pub use waiter::ElementWaiter;
