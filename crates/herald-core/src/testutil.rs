//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::PublisherConfig;
use crate::error::AppError;
use crate::models::{ArticlePayload, Credentials, PublishResult};
use crate::queue::{QueueItem, WorkQueue};
use crate::runner::{RunnerEvent, RunnerReporter};
use crate::traits::{ArticlePublisher, BrowserLauncher, HttpClient, PageDriver};

/// AppError is not Clone; sticky mock responses need copies.
fn clone_error(e: &AppError) -> AppError {
    match e {
        AppError::HttpError(s) => AppError::HttpError(s.clone()),
        AppError::NetworkError(s) => AppError::NetworkError(s.clone()),
        AppError::Timeout(n) => AppError::Timeout(*n),
        AppError::NavigationError { url, message } => AppError::NavigationError {
            url: url.clone(),
            message: message.clone(),
        },
        AppError::ElementNotFound(s) => AppError::ElementNotFound(s.clone()),
        AppError::BrowserError(s) => AppError::BrowserError(s.clone()),
        AppError::AuthRejected(s) => AppError::AuthRejected(s.clone()),
        AppError::Anomaly(s) => AppError::Anomaly(s.clone()),
        other => AppError::Generic(other.to_string()),
    }
}

/// Pop the front response, but keep the last one forever.
fn pop_sticky<T: Clone>(queue: &mut VecDeque<Result<T, AppError>>) -> Option<Result<T, AppError>> {
    if queue.len() > 1 {
        return queue.pop_front();
    }
    queue.front().map(|r| match r {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(clone_error(e)),
    })
}

/// Deterministic pseudo-image of `size` bytes; different seeds hash differently.
pub fn image_bytes(size: usize, seed: u8) -> Vec<u8> {
    (0..size)
        .map(|i| ((i as u64 * 31 + seed as u64 * 7 + 1) % 251) as u8)
        .collect()
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

/// One recorded interaction with a [`MockPage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Goto(String),
    Fill(String, String),
    Click(String),
    Select(String, String),
    Upload(String),
    Script(String, Value),
    WaitNavigation,
    Close,
}

/// A file handed to a file input, captured at upload time.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub path: PathBuf,
    pub existed_during_upload: bool,
    pub size: u64,
}

#[derive(Debug, Clone)]
struct Landing {
    url: String,
    visible: HashSet<String>,
}

impl Landing {
    fn new(url: &str, visible: &[&str]) -> Self {
        Self {
            url: url.to_string(),
            visible: visible.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    visible: HashSet<String>,
    missing: HashSet<String>,
    routes: HashMap<String, Landing>,
    clicks: HashMap<String, Landing>,
    goto_failures: HashMap<String, VecDeque<AppError>>,
    failing_selects: HashSet<String>,
    scripts: HashMap<String, VecDeque<Result<Value, AppError>>>,
    navigation_wait_error: Option<AppError>,
    calls: Vec<Call>,
    uploads: Vec<UploadRecord>,
    closed: usize,
}

impl PageState {
    fn land(&mut self, landing: Landing) {
        self.url = landing.url;
        self.visible = landing.visible;
    }
}

/// Scripted browser tab.
///
/// Navigations follow registered routes (or land on the target), clicks can
/// move the tab, selectors are present unless marked missing, and scripts
/// answer from per-script response queues (`Null` when unscripted).
#[derive(Clone, Default)]
pub struct MockPage {
    state: Arc<Mutex<PageState>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    /// Navigating to `target` lands on `landed` with `visible` selectors shown.
    pub fn route(&self, target: &str, landed: &str, visible: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(target.to_string(), Landing::new(landed, visible));
    }

    /// Clicking `selector` moves the tab to `landed`.
    pub fn on_click(&self, selector: &str, landed: &str, visible: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .clicks
            .insert(selector.to_string(), Landing::new(landed, visible));
    }

    /// Queue a failure for the next navigation to `url`.
    pub fn fail_goto(&self, url: &str, error: AppError) {
        self.state
            .lock()
            .unwrap()
            .goto_failures
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fail_select(&self, value: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_selects
            .insert(value.to_string());
    }

    pub fn set_missing(&self, selector: &str) {
        self.state
            .lock()
            .unwrap()
            .missing
            .insert(selector.to_string());
    }

    pub fn on_script(&self, script: &str, response: Value) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(script.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    pub fn fail_script(&self, script: &str, error: AppError) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(script.to_string())
            .or_default()
            .push_back(Err(error));
    }

    pub fn fail_navigation_wait(&self, error: AppError) {
        self.state.lock().unwrap().navigation_wait_error = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    fn require(state: &PageState, selector: &str) -> Result<(), AppError> {
        if state.missing.contains(selector) {
            Err(AppError::ElementNotFound(selector.to_string()))
        } else {
            Ok(())
        }
    }
}

impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Goto(url.to_string()));
        if let Some(error) = state.goto_failures.get_mut(url).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        let landing = state
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Landing::new(url, &[]));
        state.land(landing);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.url())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool, AppError> {
        Ok(self.state.lock().unwrap().visible.contains(selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Fill(selector.to_string(), value.to_string()));
        Self::require(&state, selector)
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Click(selector.to_string()));
        Self::require(&state, selector)?;
        if let Some(landing) = state.clicks.get(selector).cloned() {
            state.land(landing);
        }
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::WaitNavigation);
        match &state.navigation_wait_error {
            Some(e) => Err(clone_error(e)),
            None => Ok(()),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Select(selector.to_string(), value.to_string()));
        Self::require(&state, selector)?;
        if state.failing_selects.contains(value) {
            return Err(AppError::ElementNotFound(format!("option {value}")));
        }
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &Path) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Upload(selector.to_string()));
        state.uploads.push(UploadRecord {
            path: path.to_path_buf(),
            existed_during_upload: path.exists(),
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        });
        Ok(!state.missing.contains(selector))
    }

    async fn call_function(&self, function: &str, arg: Value) -> Result<Value, AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Script(function.to_string(), arg));
        match state.scripts.get_mut(function).and_then(pop_sticky) {
            Some(response) => response,
            None => Ok(Value::Null),
        }
    }

    async fn close(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Close);
        state.closed += 1;
        Ok(())
    }
}

/// A WellCMS-shaped site: public login, admin re-confirmation, compose form,
/// and a submit that lands on the content listing.
///
/// With `accept_credentials = false` the admin entry bounces back to the
/// public login page.
pub fn wellcms_site(config: &PublisherConfig, accept_credentials: bool) -> MockPage {
    let cms = &config.cms;
    let sel = &config.selectors;
    let home = cms
        .login_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/"))
        .unwrap_or_default();

    let page = MockPage::new();
    page.set_url("about:blank");
    page.route(&cms.login_url, &cms.login_url, &[sel.login_email.as_str()]);
    page.on_click(&sel.login_submit, &home, &[]);

    if accept_credentials {
        let reconfirm = format!("{}?0=index&1=login", cms.admin_url);
        page.route(&cms.admin_url, &reconfirm, &[sel.admin_password.as_str()]);
        page.on_click(&sel.admin_submit, &cms.admin_url, &[]);
    } else {
        page.route(&cms.admin_url, &cms.login_url, &[sel.login_email.as_str()]);
    }

    page.route(&cms.compose_url, &cms.compose_url, &[sel.title.as_str()]);
    page.on_click(&sel.submit, &cms.listing_url, &[]);
    page
}

// ---------------------------------------------------------------------------
// MockLauncher
// ---------------------------------------------------------------------------

/// Hands out clones of one [`MockPage`], so tests can inspect every session.
#[derive(Clone)]
pub struct MockLauncher {
    page: MockPage,
    error: Arc<Mutex<Option<AppError>>>,
    pub launches: Arc<Mutex<usize>>,
}

impl MockLauncher {
    pub fn new(page: MockPage) -> Self {
        Self {
            page,
            error: Arc::new(Mutex::new(None)),
            launches: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            page: MockPage::new(),
            error: Arc::new(Mutex::new(Some(error))),
            launches: Arc::new(Mutex::new(0)),
        }
    }
}

impl BrowserLauncher for MockLauncher {
    type Page = MockPage;

    async fn launch(&self) -> Result<MockPage, AppError> {
        *self.launches.lock().unwrap() += 1;
        if let Some(e) = self.error.lock().unwrap().as_ref() {
            return Err(clone_error(e));
        }
        Ok(self.page.clone())
    }
}

// ---------------------------------------------------------------------------
// MockHttp
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HttpState {
    bytes: HashMap<String, VecDeque<Result<Vec<u8>, AppError>>>,
    json: Vec<(String, VecDeque<Result<Value, AppError>>)>,
    requests: Vec<(String, Vec<(String, String)>)>,
}

/// HTTP client answering from per-URL queues; unknown URLs are 404s.
#[derive(Clone, Default)]
pub struct MockHttp {
    state: Arc<Mutex<HttpState>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_bytes(&self, url: &str, response: Result<Vec<u8>, AppError>) {
        self.state
            .lock()
            .unwrap()
            .bytes
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answer JSON requests whose URL starts with `prefix`.
    pub fn on_json_prefix(&self, prefix: &str, response: Result<Value, AppError>) {
        let mut state = self.state.lock().unwrap();
        match state.json.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push_back(response),
            None => state
                .json
                .push((prefix.to_string(), VecDeque::from([response]))),
        }
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }

    /// Headers of the first request whose URL starts with `prefix`.
    pub fn headers_for(&self, prefix: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .find(|(u, _)| u.starts_with(prefix))
            .map(|(_, h)| h.clone())
            .unwrap_or_default()
    }

    fn record(state: &mut HttpState, url: &str, headers: &[(&str, &str)]) {
        state.requests.push((
            url.to_string(),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
    }
}

impl HttpClient for MockHttp {
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, url, headers);
        state
            .bytes
            .get_mut(url)
            .and_then(pop_sticky)
            .unwrap_or_else(|| Err(AppError::HttpError(format!("HTTP 404 for {url}"))))
    }

    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, url, headers);
        state
            .json
            .iter_mut()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .and_then(|(_, queue)| pop_sticky(queue))
            .unwrap_or_else(|| Err(AppError::HttpError(format!("HTTP 404 for {url}"))))
    }
}

// ---------------------------------------------------------------------------
// MockQueue
// ---------------------------------------------------------------------------

/// A status change recorded by [`MockQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOp {
    Published(String, String),
    Failed(String),
    Reset(String),
}

#[derive(Clone)]
pub struct MockQueue {
    items: Vec<QueueItem>,
    ops: Arc<Mutex<Vec<QueueOp>>>,
}

impl MockQueue {
    pub fn new(items: Vec<QueueItem>) -> Self {
        Self {
            items,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ops(&self) -> Vec<QueueOp> {
        self.ops.lock().unwrap().clone()
    }
}

impl WorkQueue for MockQueue {
    async fn fetch_ready(&self, limit: usize) -> Result<Vec<QueueItem>, AppError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }

    async fn mark_published(&self, id: &str, url: &str, _at: DateTime<Utc>) -> Result<(), AppError> {
        self.ops
            .lock()
            .unwrap()
            .push(QueueOp::Published(id.to_string(), url.to_string()));
        Ok(())
    }

    async fn mark_failed(&self, id: &str, _reason: &str) -> Result<(), AppError> {
        self.ops
            .lock()
            .unwrap()
            .push(QueueOp::Failed(id.to_string()));
        Ok(())
    }

    async fn reset_to_ready(&self, id: &str) -> Result<(), AppError> {
        self.ops.lock().unwrap().push(QueueOp::Reset(id.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

/// Returns queued results (failure when empty) and records accounts used.
#[derive(Clone)]
pub struct MockPublisher {
    results: Arc<Mutex<VecDeque<PublishResult>>>,
    accounts: Arc<Mutex<Vec<String>>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl MockPublisher {
    pub fn new(results: Vec<PublishResult>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            accounts: Arc::new(Mutex::new(Vec::new())),
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancel `token` as soon as the first publish completes.
    pub fn cancel_after_publish(&self, token: CancellationToken) {
        *self.cancel.lock().unwrap() = Some(token);
    }

    pub fn accounts_used(&self) -> Vec<String> {
        self.accounts.lock().unwrap().clone()
    }
}

impl ArticlePublisher for MockPublisher {
    async fn publish(&self, _article: &ArticlePayload, credentials: &Credentials) -> PublishResult {
        self.accounts
            .lock()
            .unwrap()
            .push(credentials.username.clone());
        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PublishResult::failed);
        if let Some(token) = self.cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
        result
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Records runner events as short strings.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl RunnerReporter for MockReporter {
    fn report(&self, event: RunnerEvent<'_>) {
        let line = match event {
            RunnerEvent::Started { items } => format!("started:{items}"),
            RunnerEvent::ItemSkipped { id, .. } => format!("skipped:{id}"),
            RunnerEvent::ItemStarted { id, .. } => format!("start:{id}"),
            RunnerEvent::ItemPublished { id, .. } => format!("published:{id}"),
            RunnerEvent::ItemFailed { id } => format!("failed:{id}"),
            RunnerEvent::Cancelled { remaining } => format!("cancelled:{remaining}"),
            RunnerEvent::Finished { .. } => "finished".to_string(),
        };
        self.events.lock().unwrap().push(line);
    }
}
