// spider_chrome re-exports chromiumoxide API
use super::hooks::{BINDING_NAME, DOM_SNAPSHOT_SCRIPT, RECORDER_SCRIPT};
use super::page::{BrowserEvent, PageHandle, RawAction};
use crate::config::CaptureConfig;
use crate::dom::{DomSnapshot, RawDomSnapshot};
use crate::error::{CaptureError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventFrameNavigated, EventLoadEventFired,
    EventNavigatedWithinDocument, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CloseTargetParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LAUNCH_HELP: &str = "Chrome not found. You can:\n\
     - Install Chrome: https://www.google.com/chrome/\n\
     - Ubuntu/Debian: sudo apt install chromium-browser\n\
     - Fedora: sudo dnf install chromium\n\
     - macOS: brew install --cask google-chrome\n\
     - Or specify path: --chrome-path /path/to/chrome\n\
     - Linux sandbox issue? Try: --no-sandbox";

/// How to start the local Chrome instance.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chrome_path: Option<PathBuf>,
    pub no_sandbox: bool,
    pub headless: bool,
    pub navigation_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            no_sandbox: false,
            headless: false,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&CaptureConfig> for LaunchOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            no_sandbox: config.no_sandbox,
            headless: config.effective_headless(),
            navigation_timeout: config.navigation_timeout,
        }
    }
}

impl LaunchOptions {
    /// Headless and unsandboxed on CI, headed elsewhere.
    pub fn auto() -> Self {
        let is_ci = std::env::var("CI").is_ok()
            || std::env::var("GITHUB_ACTIONS").is_ok()
            || std::env::var("GITLAB_CI").is_ok()
            || std::env::var("JENKINS_HOME").is_ok()
            || std::env::var("CIRCLECI").is_ok();

        Self {
            no_sandbox: is_ci,
            headless: is_ci,
            ..Default::default()
        }
    }
}

/// Set while a navigation started by [`ChromeDriver::navigate`] has not yet
/// committed, so the event bridge can drop its main-frame echo.
#[derive(Debug, Clone, Default)]
struct OwnNavigation(Arc<AtomicBool>);

impl OwnNavigation {
    fn expect(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// True for the first commit after [`expect`](Self::expect), then false.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: PathBuf,
    navigation_timeout: Duration,
    own_navigation: OwnNavigation,
}

impl ChromeDriver {
    /// Helper method to get the current active page, excluding Chrome's new-tab-page
    async fn get_active_page(&self) -> Result<Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::Other(format!("Failed to create page: {}", e)))
    }

    /// Launch Chrome the way a run is configured
    pub async fn launch(config: &CaptureConfig) -> Result<Self> {
        Self::new(LaunchOptions::from(config)).await
    }

    /// Launch a fresh Chrome with its own throwaway profile
    pub async fn new(options: LaunchOptions) -> Result<Self> {
        // Unique profile per instance so parallel runs don't share state
        let unique_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let temp_dir = std::env::temp_dir().join(format!("gen-food-chrome-{}", unique_id));
        std::fs::create_dir_all(&temp_dir).map_err(|e| {
            CaptureError::LaunchFailed(format!("Failed to create temp directory: {}", e))
        })?;

        let mut config = if options.headless {
            BrowserConfig::builder()
        } else {
            BrowserConfig::builder().with_head()
        };
        config = config.user_data_dir(&temp_dir);

        // Linux AppArmor workaround
        if options.no_sandbox {
            config = config.arg("--no-sandbox");
        }
        if let Some(path) = &options.chrome_path {
            config = config.chrome_executable(path);
        }

        log::info!(
            "🌐 Launching Chrome ({})",
            if options.headless { "headless" } else { "headed" }
        );

        let config = config
            .build()
            .map_err(|e| CaptureError::LaunchFailed(format!("{}. \n\n{}", e, LAUNCH_HELP)))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::LaunchFailed(format!("{}. \n\n{}", e, LAUNCH_HELP)))?;

        tokio::spawn(async move {
            while (handler.next().await).is_some() {
                // Handle browser events
            }
            log::debug!("Browser handler stopped");
        });

        Ok(Self {
            browser,
            temp_dir,
            navigation_timeout: options.navigation_timeout,
            own_navigation: OwnNavigation::default(),
        })
    }

    /// Navigate to a URL and wait for its load event
    pub async fn navigate(&self, url: &str) -> Result<()> {
        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            log::debug!("Normalizing URL: {} -> https://{}", url, url);
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::info!("🌐 Navigating to: {}", normalized_url);

        let pages = self.browser.pages().await?;
        for (i, p) in pages.iter().enumerate().skip(1) {
            log::debug!("Closing extra page {}", i);
            let _ = p.execute(CloseTargetParams::new(p.target_id().clone())).await;
        }
        let page = self.get_active_page().await?;

        // Subscribe before navigating so a fast load is not missed
        let mut load_events = page.event_listener::<EventLoadEventFired>().await?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                CaptureError::NavigationFailed(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        self.own_navigation.expect();
        let response = page.execute(params).await.map_err(|e| {
            self.own_navigation.cancel();
            // "oneshot canceled" means the browser connection is gone
            if e.to_string().contains("oneshot canceled") {
                CaptureError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                CaptureError::NavigationFailed(format!(
                    "Failed to navigate to {}: {}",
                    normalized_url, e
                ))
            }
        })?;

        if let Some(error_text) = response.result.error_text.clone() {
            log::error!("❌ Navigation error from browser: {}", error_text);
            return Err(CaptureError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        match tokio::time::timeout(self.navigation_timeout, load_events.next()).await {
            Ok(Some(_)) => log::debug!("✓ Page load event fired"),
            Ok(None) => log::warn!("Load event stream ended before the page loaded"),
            Err(_) => {
                return Err(CaptureError::NavigationFailed(format!(
                    "Timeout waiting for page load event after {}s: {}",
                    self.navigation_timeout.as_secs(),
                    normalized_url
                )));
            }
        }

        log::info!("✓ Navigation completed");
        Ok(())
    }

    /// Get current URL
    pub async fn current_url(&self) -> Result<String> {
        let page = self.get_active_page().await?;
        page.url().await?.ok_or(CaptureError::NoPage)
    }

    /// Get page title
    pub async fn title(&self) -> Result<String> {
        let page = self.get_active_page().await?;
        Ok(page.get_title().await?.unwrap_or_default())
    }

    /// Get page HTML source
    pub async fn get_page_source(&self) -> Result<String> {
        let page = self.get_active_page().await?;
        Ok(page.content().await?)
    }

    /// Full-page PNG of the current page
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.get_active_page().await?;

        page.screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| CaptureError::Other(format!("Failed to take screenshot: {}", e)))
    }

    /// Take a screenshot and save to file
    pub async fn screenshot_to_file(&self, path: &Path) -> Result<()> {
        let screenshot_data = self.screenshot().await?;

        tokio::fs::write(path, screenshot_data)
            .await
            .map_err(|e| CaptureError::from_io(path, e))
    }

    /// Execute JavaScript and return a specific type
    pub async fn execute_script_typed<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
    ) -> Result<T> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| CaptureError::Script(format!("Script execution failed: {}", e)))?;

        result
            .into_value()
            .map_err(|e| CaptureError::Script(format!("Failed to deserialize result: {}", e)))
    }

    /// Install the action recorder and forward page events to `tx`.
    ///
    /// The recorder script is registered for every new document and also run
    /// once in the current one. The main-frame commit caused by our own
    /// [`navigate`](Self::navigate) is not forwarded; every other commit,
    /// reloads included, is. The returned task ends when the page goes away
    /// or the receiver is dropped; either way `tx` is dropped with it.
    pub async fn start_event_bridge(
        &self,
        tx: mpsc::Sender<BrowserEvent>,
    ) -> Result<JoinHandle<()>> {
        let page = self.get_active_page().await?;

        page.execute(AddBindingParams::new(BINDING_NAME)).await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(RECORDER_SCRIPT))
            .await?;
        if let Err(e) = page.evaluate(RECORDER_SCRIPT).await {
            log::warn!("Recorder not installed in current document: {}", e);
        }

        let main_frame = page.mainframe().await?;

        let actions = page
            .event_listener::<EventBindingCalled>()
            .await?
            .filter_map(|ev| {
                let event = if ev.name == BINDING_NAME {
                    match serde_json::from_str::<RawAction>(&ev.payload) {
                        Ok(raw) => Some(BrowserEvent::Action(raw)),
                        Err(e) => {
                            log::debug!("Ignoring malformed recorder payload: {}", e);
                            None
                        }
                    }
                } else {
                    None
                };
                futures::future::ready(event)
            })
            .boxed();

        let own_navigation = self.own_navigation.clone();
        let loads = page
            .event_listener::<EventFrameNavigated>()
            .await?
            .filter_map(move |ev| {
                let is_user_commit = ev.frame.parent_id.is_none() && !own_navigation.take();
                let event = is_user_commit.then(|| BrowserEvent::Navigated {
                    url: ev.frame.url.clone(),
                });
                futures::future::ready(event)
            })
            .boxed();

        let in_document = page
            .event_listener::<EventNavigatedWithinDocument>()
            .await?
            .filter_map(move |ev| {
                let is_main = main_frame.as_ref().map_or(true, |id| *id == ev.frame_id);
                let event = is_main.then(|| BrowserEvent::Navigated {
                    url: ev.url.clone(),
                });
                futures::future::ready(event)
            })
            .boxed();

        let streams: Vec<BoxStream<'static, BrowserEvent>> = vec![actions, loads, in_document];
        let mut events = futures::stream::select_all(streams);

        log::info!("🔍 Recording user actions");
        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            log::debug!("Event bridge stopped");
        }))
    }

    /// Close the browser connection
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

#[async_trait]
impl PageHandle for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.navigate(url).await
    }

    async fn current_url(&self) -> Result<String> {
        ChromeDriver::current_url(self).await
    }

    async fn title(&self) -> Result<String> {
        ChromeDriver::title(self).await
    }

    async fn content(&self) -> Result<String> {
        self.get_page_source().await
    }

    async fn dom_snapshot(&self) -> Result<DomSnapshot> {
        let raw: RawDomSnapshot = self.execute_script_typed(DOM_SNAPSHOT_SCRIPT).await?;
        Ok(raw.into())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.screenshot_to_file(path).await
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                let state: String = self
                    .execute_script_typed("document.readyState")
                    .await
                    .unwrap_or_default();
                if state == "complete" {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            CaptureError::NavigationFailed(format!(
                "Timeout waiting for document ready after {}s",
                timeout.as_secs()
            ))
        })
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        // Clean up the throwaway profile
        if self.temp_dir.exists() {
            let _ = std::fs::remove_dir_all(&self.temp_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_navigation_swallows_one_commit() {
        let own = OwnNavigation::default();
        assert!(!own.take());

        own.expect();
        let bridge_side = own.clone();
        assert!(bridge_side.take());
        // A reload of the same page right after is a user navigation
        assert!(!bridge_side.take());
    }

    #[test]
    fn test_cancelled_navigation_expects_nothing() {
        let own = OwnNavigation::default();
        own.expect();
        own.cancel();
        assert!(!own.take());
    }
}
