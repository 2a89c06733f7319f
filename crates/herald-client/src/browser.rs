use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use herald_core::error::AppError;
use herald_core::traits::{BrowserLauncher, PageDriver};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Hides the most obvious automation markers before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

const VISIBLE_SCRIPT: &str = r#"function (selector) {
    const el = document.querySelector(selector);
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 || rect.height > 0;
}"#;

const FILL_SCRIPT: &str = r#"function (args) {
    const el = document.querySelector(args.selector);
    if (!el) return false;
    el.focus();
    el.value = args.value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const SELECT_SCRIPT: &str = r#"function (args) {
    const el = document.querySelector(args.selector);
    if (!el) return 'missing';
    const option = Array.from(el.options || []).find(o => o.value === args.value);
    if (!option) return 'no-option';
    el.value = args.value;
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return 'ok';
}"#;

const SELECTOR_POLL: Duration = Duration::from_millis(250);
/// Grace period for the browser process to exit after `Browser.close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How each publish attempt's browser is started.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; otherwise well-known paths are searched.
    pub chrome_bin: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub navigation_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_bin: None,
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Launches one isolated Chromium per publish attempt.
///
/// Every launch gets its own throwaway profile directory, so cookies and
/// storage never leak between accounts.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: LaunchOptions,
}

impl ChromiumLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    fn config(&self, profile: &Path) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .user_data_dir(profile);

        // Snap-packaged Chromium ships a wrapper that rejects standard flags.
        if let Some(bin) = find_chrome_binary(self.options.chrome_bin.as_deref()) {
            tracing::debug!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        if self.options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(agent) = &self.options.user_agent {
            builder = builder.arg(format!("--user-agent={agent}"));
        }

        builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--window-size=1366,900")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<ChromiumPage, AppError> {
        let profile = tempfile::Builder::new()
            .prefix("herald-profile-")
            .tempdir()
            .map_err(|e| AppError::BrowserError(format!("Failed to create profile dir: {e}")))?;
        let config = self.config(profile.path())?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(cdp_error(e));
            }
        };

        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_SCRIPT)
            .build()
            .map_err(AppError::BrowserError)?;
        if let Err(e) = page.evaluate_on_new_document(stealth).await {
            tracing::warn!(error = %e, "Failed to install stealth script");
        }

        tracing::debug!(headless = self.options.headless, "Browser launched");
        Ok(ChromiumPage {
            page,
            browser: Mutex::new(Some(browser)),
            handler,
            navigation_timeout: self.options.navigation_timeout,
            _profile: profile,
        })
    }
}

/// A single Chromium tab implementing [`PageDriver`].
///
/// Owns its browser process; [`PageDriver::close`] shuts it down and is
/// idempotent. Dropping without closing aborts the CDP handler and lets
/// chromiumoxide kill the child process.
pub struct ChromiumPage {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
    _profile: TempDir,
}

impl ChromiumPage {
    async fn evaluate(&self, expression: String) -> Result<Value, AppError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(AppError::BrowserError)?;
        let result = self.page.evaluate_expression(params).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), AppError> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(AppError::Timeout(self.navigation_timeout.as_secs())),
        }
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self.page.url().await.map_err(cdp_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let visible = self.call_function(VISIBLE_SCRIPT, json!(selector)).await?;
            if visible.as_bool() == Some(true) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AppError> {
        let found = self
            .call_function(FILL_SCRIPT, json!({ "selector": selector, "value": value }))
            .await?;
        if found.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(AppError::ElementNotFound(selector.to_string()))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AppError::ElementNotFound(selector.to_string()))?;
        element.click().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), AppError> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(cdp_error(e)),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), AppError> {
        let outcome = self
            .call_function(SELECT_SCRIPT, json!({ "selector": selector, "value": value }))
            .await?;
        match outcome.as_str() {
            Some("ok") => Ok(()),
            Some("no-option") => Err(AppError::Anomaly(format!(
                "No option '{value}' in {selector}"
            ))),
            _ => Err(AppError::ElementNotFound(selector.to_string())),
        }
    }

    async fn upload_file(&self, selector: &str, path: &Path) -> Result<bool, AppError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        let mut params = SetFileInputFilesParams::new(vec![path.display().to_string()]);
        params.backend_node_id = Some(element.backend_node_id);
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(true)
    }

    async fn call_function(&self, function: &str, arg: Value) -> Result<Value, AppError> {
        self.evaluate(function_call_expression(function, &arg)).await
    }

    async fn close(&self) -> Result<(), AppError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        let closed = browser.close().await;
        let exited = closed.is_ok() && exited_within(CLOSE_TIMEOUT, browser.wait()).await;
        if !exited {
            tracing::warn!(timeout_secs = CLOSE_TIMEOUT.as_secs(), "Browser did not exit, killing it");
            if let Some(Err(e)) = browser.kill().await {
                tracing::warn!(error = %e, "Failed to kill browser process");
            }
        }
        self.handler.abort();
        closed.map(|_| ()).map_err(cdp_error)
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Whether `exit` completes before `limit` elapses.
async fn exited_within<F: Future>(limit: Duration, exit: F) -> bool {
    tokio::time::timeout(limit, exit).await.is_ok()
}

/// Wrap a function expression so it is invoked with one JSON argument.
fn function_call_expression(function: &str, arg: &Value) -> String {
    format!("({})({})", function.trim(), arg)
}

fn cdp_error(e: impl Display) -> AppError {
    AppError::BrowserError(e.to_string())
}

/// Locate a real Chrome/Chromium binary.
///
/// An explicit path wins when it exists. The snap-internal binary is checked
/// before the wrapper-prone system paths. `None` lets chromiumoxide search.
pub fn find_chrome_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }

    const CANDIDATES: &[&str] = &[
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];
    CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists())
}
