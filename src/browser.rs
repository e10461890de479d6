//! Browser runtime discovery and scoped session management.
//!
//! A `BrowserSession` owns one Chromium process, its CDP event handler task
//! and (optionally) a unique temp profile directory. The session is released
//! on every exit path: `close()` for the orderly case, `Drop` as a fallback
//! so a panicking worker never leaks a Chrome process or profile dir.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::element::Element;
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::future::Future;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// User agent presented by harvest sessions.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Find a Chrome/Chromium executable on the system.
///
/// Checks the `CHROMIUM_PATH` environment variable first, then well-known
/// installation paths per platform, then `which` on Unix.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let paths: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser via 'which': {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    Err(anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium if no system browser is available.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("listascrape")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;
    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Resolve a usable browser executable, downloading one as a last resort.
///
/// The engine calls this before scheduling any work so that a missing
/// runtime fails the whole run up front instead of failing every chunk.
pub async fn resolve_browser() -> Result<PathBuf> {
    match find_browser_executable().await {
        Ok(path) => Ok(path),
        Err(_) => download_managed_browser()
            .await
            .context("No system browser and managed download failed"),
    }
}

/// One Chromium process scoped to a single owner (a worker's chunk, or one
/// discovery pass). Never shared across workers, never reused past its
/// owner's lifetime.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Set only when the session created its own temp profile; a fixed
    /// profile dir supplied by the caller is left in place.
    temp_profile: Option<PathBuf>,
}

impl BrowserSession {
    /// Launch a fresh Chromium process.
    ///
    /// When `profile_dir` is `None`, a unique temp profile is created and
    /// removed again when the session closes.
    pub async fn launch(headless: bool, profile_dir: Option<PathBuf>) -> Result<Self> {
        let chrome_path = resolve_browser().await?;

        let (user_data_dir, temp_profile) = match profile_dir {
            Some(dir) => (dir, None),
            None => {
                let dir = std::env::temp_dir().join(format!(
                    "listascrape_{}_{}",
                    std::process::id(),
                    rand::random::<u32>()
                ));
                (dir.clone(), Some(dir))
            }
        };
        std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

        let mut config_builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(1920, 1080)
            .user_data_dir(user_data_dir)
            .chrome_executable(chrome_path);

        config_builder = if headless {
            config_builder.headless_mode(HeadlessMode::default())
        } else {
            config_builder.with_head()
        };

        config_builder = config_builder
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-infobars")
            .arg("--disable-popup-blocking")
            .arg("--disable-background-networking")
            .arg("--disable-hang-monitor")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--mute-audio");

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        debug!("Launching Chromium session");
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let msg = e.to_string();
                    // Chrome emits CDP events chromiumoxide cannot deserialize;
                    // those are noise, not session failures.
                    let benign = msg.contains("data did not match any variant")
                        || msg.contains("Failed to deserialize WS response");
                    if benign {
                        trace!("Suppressed benign CDP serialization error: {msg}");
                    } else {
                        tracing::error!("Browser handler error: {msg}");
                    }
                }
            }
            debug!("Browser handler task completed");
        });

        Ok(Self {
            browser,
            handler: handler_task,
            temp_profile,
        })
    }

    /// Open a new page in this session.
    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .context("Failed to create page")
    }

    /// Close the session: shut down Chrome, wait for the process to exit,
    /// stop the handler task and remove the temp profile.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {e}");
        }
        self.handler.abort();
        if let Some(dir) = self.temp_profile.take()
            && let Err(e) = std::fs::remove_dir_all(&dir)
        {
            warn!("Failed to remove temp profile {}: {e}", dir.display());
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Orderly shutdown happens in close(); this is the fallback path.
        self.handler.abort();
        if let Some(dir) = self.temp_profile.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(
                    "Failed to remove temp profile {} in Drop: {e}",
                    dir.display()
                );
            }
        }
    }
}

/// Wrap an async page operation with an explicit timeout.
///
/// Every suspension point in the engine goes through a bounded wait; on
/// expiry the caller decides between retry and NotFound classification.
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{operation_name} timeout after {timeout:?}")),
    }
}

/// Poll until a selector matches, returning the element.
///
/// `page.wait_for_navigation()` resolves when the HTTP response lands, not
/// when client-side rendering finishes, so markup waits must poll.
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<Element> {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(200);

    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(_) if start.elapsed() >= timeout => {
                return Err(anyhow!(
                    "Timeout waiting for selector '{selector}' after {timeout:?}"
                ));
            }
            Err(_) => tokio::time::sleep(poll_interval).await,
        }
    }
}

/// Poll until a selector matches a visible element (`offsetParent` set).
pub async fn wait_for_visible(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    poll_visibility(page, selector, timeout, true).await
}

/// Poll until no visible element matches the selector.
pub async fn wait_for_hidden(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    poll_visibility(page, selector, timeout, false).await
}

async fn poll_visibility(
    page: &Page,
    selector: &str,
    timeout: Duration,
    want_visible: bool,
) -> Result<()> {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(200);
    let script = format!(
        "(() => {{ const el = document.querySelector('{selector}'); \
         return !!(el && el.offsetParent !== null); }})()"
    );

    loop {
        let visible = page
            .evaluate(script.as_str())
            .await
            .ok()
            .and_then(|r| r.into_value::<bool>().ok())
            .unwrap_or(false);
        if visible == want_visible {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            let state = if want_visible { "visible" } else { "hidden" };
            return Err(anyhow!(
                "Timeout waiting for '{selector}' to become {state} after {timeout:?}"
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Click an element, falling back to a script-dispatched click when direct
/// interaction is intercepted or the element is not interactable.
pub async fn click_with_fallback(page: &Page, element: &Element, selector: &str) -> Result<()> {
    if element.scroll_into_view().await.is_err() {
        trace!("scroll_into_view failed for '{selector}', clicking anyway");
    }
    match element.click().await {
        Ok(_) => Ok(()),
        Err(e) => {
            debug!("Direct click on '{selector}' failed ({e}), dispatching via script");
            let script =
                format!("(() => {{ document.querySelector('{selector}').click(); return true; }})()");
            page.evaluate(script.as_str())
                .await
                .map(|_| ())
                .with_context(|| format!("Script-dispatched click on '{selector}' failed"))
        }
    }
}
