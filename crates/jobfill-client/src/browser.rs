//! Browser-backed job detail sessions using Chromium via the Chrome DevTools
//! Protocol.
//!
//! Each worker owns one [`BrowserSession`] (one Chromium process). A fetch
//! opens a new tab, waits for the page to settle, reads the rendered DOM,
//! and closes the tab. Crash-shaped CDP errors are reported as
//! [`FetchOutcome::SessionCrashed`] so the coordinator can replace the
//! session instead of failing the rest of the batch.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use jobfill_core::error::AppError;
use jobfill_core::job::FetchOutcome;
use jobfill_core::traits::{DetailSession, SessionFactory};
use tokio::task::JoinHandle;

use crate::parse;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// CDP error substrings (lowercase) that mean the browser process or its
/// target window is gone, not that this particular page failed.
const CRASH_MARKERS: &[&str] = &[
    "no such window",
    "target window already closed",
    "session closed",
    "target closed",
];

/// Launch and timing parameters for one browser session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    /// Upper bound on one whole fetch, navigation included.
    pub page_load_timeout: Duration,
    /// Wait after navigation for client-side rendering to finish.
    pub settle_delay: Duration,
    /// Wait before re-reading a page that showed a challenge interstitial.
    pub challenge_delay: Duration,
    /// X display to attach to (e.g. `":99"` for an Xvfb server). `None`
    /// inherits the environment.
    pub display: Option<String>,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(3),
            challenge_delay: Duration::from_secs(10),
            display: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Factory producing independent Chromium processes from a shared config.
#[derive(Clone)]
pub struct BrowserSessionFactory {
    config: SessionConfig,
}

impl BrowserSessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for BrowserSessionFactory {
    type Session = BrowserSession;

    async fn create(&self) -> Result<BrowserSession, AppError> {
        BrowserSession::launch(&self.config).await
    }
}

/// One Chromium process plus the spawned task polling its CDP handler.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page_load_timeout: Duration,
    settle_delay: Duration,
    challenge_delay: Duration,
}

impl BrowserSession {
    pub async fn launch(config: &SessionConfig) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags (--headless, --disable-gpu, …).  We try to
        // locate the *real* binary buried inside the snap, falling back
        // to any other Chrome/Chromium the user may have installed.
        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if config.headless {
            builder = builder.arg("--headless=new");
        }
        if let Some(display) = &config.display {
            builder = builder.arg(format!("--display={display}"));
        }

        let browser_config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .arg("--lang=en-AU")
            .arg(format!("--user-agent={}", config.user_agent))
            .build()
            .map_err(|e| AppError::SessionError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::SessionError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            page_load_timeout: config.page_load_timeout,
            settle_delay: config.settle_delay,
            challenge_delay: config.challenge_delay,
        })
    }

    async fn fetch_inner(&self, url: &str) -> FetchOutcome {
        let page = match self.browser.new_page(url).await {
            Ok(page) => page,
            Err(e) => return classify_cdp_error(&e.to_string()),
        };

        tokio::time::sleep(self.settle_delay).await;

        let mut html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                let _ = page.close().await;
                return classify_cdp_error(&e.to_string());
            }
        };

        // Challenge interstitials often clear on their own; wait once and
        // re-read before declaring the page blocked.
        if parse::is_challenge(&html) {
            tracing::warn!(url, "Anti-bot challenge detected, waiting for it to clear");
            tokio::time::sleep(self.challenge_delay).await;
            html = match page.content().await {
                Ok(html) => html,
                Err(e) => {
                    let _ = page.close().await;
                    return classify_cdp_error(&e.to_string());
                }
            };
        }

        let _ = page.close().await;

        if parse::is_challenge(&html) {
            return FetchOutcome::CloudflareBlocked;
        }
        match parse::extract_detail(&html) {
            Some(detail) => FetchOutcome::Success {
                description: detail.description_html,
                suburb: detail.suburb,
            },
            None => FetchOutcome::NoContent,
        }
    }
}

impl DetailSession for BrowserSession {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        match tokio::time::timeout(self.page_load_timeout, self.fetch_inner(url)).await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Timeout,
        }
    }

    async fn is_alive(&self) -> bool {
        self.browser.version().await.is_ok()
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {e}");
        }
        self.handler_task.abort();
    }
}

fn classify_cdp_error(message: &str) -> FetchOutcome {
    let lower = message.to_lowercase();
    if CRASH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        FetchOutcome::SessionCrashed
    } else {
        FetchOutcome::OtherError(message.to_string())
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// On systems where Chromium is installed via **snap**, the wrapper at
/// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
/// We look for the real binary inside the snap first, then fall back to
/// well-known system paths.  If nothing is found we return `None` and let
/// `chromiumoxide` do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    // Also honour an explicit override via env var.
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_markers_are_recognized() {
        assert_eq!(
            classify_cdp_error("Browser error: No such window"),
            FetchOutcome::SessionCrashed
        );
        assert_eq!(
            classify_cdp_error("Target window already closed"),
            FetchOutcome::SessionCrashed
        );
        assert!(matches!(
            classify_cdp_error("net::ERR_NAME_NOT_RESOLVED"),
            FetchOutcome::OtherError(_)
        ));
    }
}
