//! Browser session lifecycle: open, login, close

use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserPage, PageElement};
use crate::config::{Credentials, Expectations, HarnessConfig, Selectors, Timeouts, ViewportPolicy};
use crate::error::{E2eError, E2eResult};
use crate::waiter::ElementWaiter;

/// An authenticated (or about to be) browser context owned by one scenario.
///
/// Never shared between scenarios. Release with [`Session::close`]; dropping
/// an unclosed session only logs, since the backend's own `Drop` reclaims
/// what it can but cannot wait for the browser to exit.
pub struct Session<P: BrowserPage> {
    page: Option<P>,
    base_url: String,
    waiter: ElementWaiter,
}

impl<P: BrowserPage> Session<P> {
    pub fn page(&self) -> E2eResult<&P> {
        self.page
            .as_ref()
            .ok_or_else(|| E2eError::Browser("session already closed".to_string()))
    }

    /// Waiter carrying this session's default wait floor
    pub fn waiter(&self) -> &ElementWaiter {
        &self.waiter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_open(&self) -> bool {
        self.page.is_some()
    }

    /// Release the browser context. Safe to call more than once.
    pub async fn close(&mut self) -> E2eResult<()> {
        match self.page.take() {
            Some(mut page) => {
                debug!("Closing session for {}", self.base_url);
                page.close().await
            }
            None => Ok(()),
        }
    }
}

impl<P: BrowserPage> Drop for Session<P> {
    fn drop(&mut self) {
        if self.page.is_some() {
            warn!("Session for {} dropped without close", self.base_url);
        }
    }
}

/// Opens sessions and runs the login flow
pub struct SessionDriver<L: BrowserLauncher> {
    launcher: L,
    timeouts: Timeouts,
    selectors: Selectors,
    expectations: Expectations,
}

impl<L: BrowserLauncher> SessionDriver<L> {
    pub fn new(launcher: L, config: &HarnessConfig) -> Self {
        Self {
            launcher,
            timeouts: config.timeouts.clone(),
            selectors: config.selectors.clone(),
            expectations: config.expectations.clone(),
        }
    }

    /// Launch an isolated context for `base_url` with the default wait floor
    pub async fn open(&self, base_url: &str, viewport: &ViewportPolicy) -> E2eResult<Session<L::Page>> {
        let page = self.launcher.launch(viewport).await?;
        info!("Opened session for {}", base_url);

        Ok(Session {
            page: Some(page),
            base_url: base_url.to_string(),
            waiter: ElementWaiter::from_timeouts(&self.timeouts),
        })
    }

    /// Log in from the application root and verify the landing page.
    ///
    /// Text mismatches and a missing dashboard surface as [`E2eError::Login`]
    /// and are never retried.
    pub async fn login(&self, session: &Session<L::Page>, credentials: &Credentials) -> E2eResult<()> {
        let page = session.page()?;
        let waiter = session.waiter();
        let sel = &self.selectors;

        page.goto(session.base_url()).await?;

        let heading = waiter.find(page, &sel.login_heading).await?.text().await?;
        expect_login_text("login heading", &self.expectations.login_heading, &heading)?;

        let username = waiter.find(page, &sel.username).await?;
        username.clear().await?;
        username.send_keys(&credentials.email).await?;

        let password = waiter.find(page, &sel.password).await?;
        password.clear().await?;
        password.send_keys(&credentials.password).await?;

        waiter.find(page, &sel.login_submit).await?.click().await?;
        page.wait_for_navigation().await?;

        // Rejected credentials leave the login view in place
        let headline = match waiter.find(page, &sel.page_headline).await {
            Ok(element) => element.text().await?,
            Err(E2eError::ElementNotFound { locator, timeout_ms }) => {
                return Err(E2eError::Login(format!(
                    "no dashboard after submit ({} not found within {} ms)",
                    locator, timeout_ms
                )));
            }
            Err(e) => return Err(e),
        };
        expect_login_text("dashboard heading", &self.expectations.dashboard_heading, &headline)?;

        let user = waiter.find(page, &sel.user_panel).await?.text().await?;
        expect_login_text("user panel", &credentials.email, &user)?;

        info!("Logged in as {}", credentials.email);
        Ok(())
    }
}

fn expect_login_text(what: &str, expected: &str, actual: &str) -> E2eResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(E2eError::Login(format!(
            "{}: expected {:?}, got {:?}",
            what, expected, actual
        )))
    }
}
