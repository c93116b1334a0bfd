//! Bounded element resolution
//!
//! Every lookup polls in place until the element appears or the bound
//! expires. There is no background watcher and no retry beyond the window.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{BrowserPage, PageElement};
use crate::config::Timeouts;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

#[derive(Debug, Clone)]
pub struct ElementWaiter {
    default_timeout: Duration,
    poll_interval: Duration,
}

impl ElementWaiter {
    pub fn new(default_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            default_timeout,
            poll_interval,
        }
    }

    pub fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self::new(timeouts.default_wait(), timeouts.poll_interval())
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Bound for `locator`: its own override, else the waiter default
    pub fn timeout_for(&self, locator: &Locator) -> Duration {
        locator.timeout().unwrap_or(self.default_timeout)
    }

    /// Wait for `locator` using its override or the default bound
    pub async fn find<P: BrowserPage>(&self, page: &P, locator: &Locator) -> E2eResult<P::Element> {
        self.find_within(page, locator, self.timeout_for(locator)).await
    }

    /// Wait for `locator` with an explicit bound for this call only
    pub async fn find_within<P: BrowserPage>(
        &self,
        page: &P,
        locator: &Locator,
        timeout: Duration,
    ) -> E2eResult<P::Element> {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if let Some(element) = page.query(locator).await? {
                debug!("Found {} after {} attempt(s)", locator, attempts);
                return Ok(element);
            }
            if start.elapsed() >= timeout {
                warn!("Gave up on {} after {:?}", locator, timeout);
                return Err(E2eError::element_not_found(locator, timeout));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Wait until `element`, found earlier through `locator`, has left the
    /// document, i.e. the area it belonged to was re-rendered.
    pub async fn wait_detached<E: PageElement>(
        &self,
        element: &E,
        locator: &Locator,
        timeout: Duration,
    ) -> E2eResult<()> {
        let start = Instant::now();

        loop {
            if !element.is_attached().await? {
                debug!("{} replaced after {:?}", locator, start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                warn!("{} still showing previous content after {:?}", locator, timeout);
                return Err(E2eError::Timeout(format!(
                    "{} to refresh within {} ms",
                    locator,
                    timeout.as_millis()
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Wait for the first of `locators` to resolve to a displayed element.
    ///
    /// Returns the index of the winning locator with its element. Expiry is
    /// reported against all candidates.
    pub async fn find_first_displayed<P: BrowserPage>(
        &self,
        page: &P,
        locators: &[&Locator],
        timeout: Duration,
    ) -> E2eResult<(usize, P::Element)> {
        let start = Instant::now();

        loop {
            for (index, locator) in locators.iter().enumerate() {
                if let Some(element) = page.query(locator).await? {
                    if element.is_displayed().await? {
                        debug!("{} resolved first", locator);
                        return Ok((index, element));
                    }
                }
            }
            if start.elapsed() >= timeout {
                let described = locators
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ");
                warn!("None of [{}] appeared within {:?}", described, timeout);
                return Err(E2eError::element_not_found(described, timeout));
            }
            sleep(self.poll_interval).await;
        }
    }
}

impl Default for ElementWaiter {
    fn default() -> Self {
        Self::from_timeouts(&Timeouts::default())
    }
}
