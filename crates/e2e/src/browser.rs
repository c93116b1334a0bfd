//! Browser automation backend
//!
//! The harness talks to the browser through three small traits so the
//! interaction protocol can be exercised without Chrome. [`ChromeLauncher`]
//! is the real backend, driving Chrome over CDP with `chromiumoxide`.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ViewportPolicy;
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, Strategy};

/// Starts an isolated browser context
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Page: BrowserPage + 'static;

    /// Launch a fresh context sharing no cookies or storage with any other
    async fn launch(&self, viewport: &ViewportPolicy) -> E2eResult<Self::Page>;
}

/// One tab of an isolated browser context
#[async_trait]
pub trait BrowserPage: Send + Sync {
    type Element: PageElement + 'static;

    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Resolve `locator` once, without waiting
    async fn query(&self, locator: &Locator) -> E2eResult<Option<Self::Element>>;

    /// Resolve every element matching `locator` once, in document order
    async fn query_all(&self, locator: &Locator) -> E2eResult<Vec<Self::Element>>;

    /// Wait until a navigation triggered by the last action has settled
    async fn wait_for_navigation(&self) -> E2eResult<()>;

    /// Release the context and every process behind it
    async fn close(&mut self) -> E2eResult<()>;
}

#[async_trait]
pub trait PageElement: Send + Sync {
    async fn click(&self) -> E2eResult<()>;
    async fn clear(&self) -> E2eResult<()>;
    async fn send_keys(&self, text: &str) -> E2eResult<()>;

    /// Rendered text, trimmed
    async fn text(&self) -> E2eResult<String>;

    async fn is_displayed(&self) -> E2eResult<bool>;

    /// Whether the element still belongs to the live document. False once
    /// the page has been reloaded or the node replaced.
    async fn is_attached(&self) -> E2eResult<bool>;

    /// Rendered height in CSS pixels
    async fn height(&self) -> E2eResult<f64>;
}

const CLEAR_JS: &str = "function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }";

const DISPLAYED_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";

const CONNECTED_JS: &str = "function() { return this.isConnected; }";

/// Launches headless or headed Chrome in incognito mode
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    /// Extra command line switches, e.g. `--no-sandbox` in containers
    pub extra_args: Vec<String>,
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Page = ChromePage;

    async fn launch(&self, viewport: &ViewportPolicy) -> E2eResult<ChromePage> {
        let mut builder = BrowserConfig::builder().arg("--incognito");

        builder = match viewport {
            ViewportPolicy::Maximized { .. } => builder
                .arg("--start-maximized")
                .window_size(1920, 1080)
                .viewport(None),
            ViewportPolicy::Fixed { width, height, .. } => {
                builder.window_size(*width, *height).viewport(None)
            }
        };
        if !viewport.headless() {
            builder = builder.with_head();
        }
        for arg in &self.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(E2eError::Browser)?;

        info!("Launching Chrome ({:?})", viewport);
        let (browser, mut handler) = Browser::launch(config).await?;

        // CDP events must be pumped for any command to complete
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e.into());
            }
        };

        Ok(ChromePage {
            browser: Some(browser),
            page,
            handler_task: Some(handler_task),
        })
    }
}

/// A Chrome tab plus the browser process that owns it
pub struct ChromePage {
    browser: Option<Browser>,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrowserPage for ChromePage {
    type Element = ChromeElement;

    async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn query(&self, locator: &Locator) -> E2eResult<Option<ChromeElement>> {
        // Lookup misses surface as CDP errors; at this layer they mean "not yet"
        let found = match &locator.strategy {
            Strategy::XPath(path) => self.page.find_xpath(path.as_str()).await,
            _ => match locator.to_css() {
                Some(css) => self.page.find_element(css).await,
                None => return Ok(None),
            },
        };
        Ok(found.ok().map(ChromeElement))
    }

    async fn query_all(&self, locator: &Locator) -> E2eResult<Vec<ChromeElement>> {
        let found = match &locator.strategy {
            Strategy::XPath(path) => self.page.find_xpaths(path.as_str()).await,
            _ => match locator.to_css() {
                Some(css) => self.page.find_elements(css).await,
                None => return Ok(Vec::new()),
            },
        };
        Ok(found
            .map(|elements| elements.into_iter().map(ChromeElement).collect())
            .unwrap_or_default())
    }

    async fn wait_for_navigation(&self) -> E2eResult<()> {
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let result = match browser.close().await {
            Ok(_) => browser.wait().await.map(|_| ()).map_err(E2eError::from),
            Err(e) => {
                warn!("Graceful browser close failed: {}", e);
                let _ = browser.kill().await;
                Err(e.into())
            }
        };

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        info!("Browser closed");
        result
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

pub struct ChromeElement(Element);

#[async_trait]
impl PageElement for ChromeElement {
    async fn click(&self) -> E2eResult<()> {
        self.0.click().await?;
        Ok(())
    }

    async fn clear(&self) -> E2eResult<()> {
        self.0.call_js_fn(CLEAR_JS, false).await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> E2eResult<()> {
        self.0.focus().await?;
        self.0.type_str(text).await?;
        Ok(())
    }

    async fn text(&self) -> E2eResult<String> {
        let text = self.0.inner_text().await?.unwrap_or_default();
        Ok(text.trim().to_string())
    }

    async fn is_displayed(&self) -> E2eResult<bool> {
        let ret = self.0.call_js_fn(DISPLAYED_JS, false).await?;
        Ok(ret
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn is_attached(&self) -> E2eResult<bool> {
        // The remote object dies with its document, which also means detached
        match self.0.call_js_fn(CONNECTED_JS, false).await {
            Ok(ret) => Ok(ret
                .result
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false)),
            Err(e) => {
                debug!("Element handle no longer resolves: {}", e);
                Ok(false)
            }
        }
    }

    async fn height(&self) -> E2eResult<f64> {
        let bbox = self.0.bounding_box().await?;
        Ok(bbox.height)
    }
}
