use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{ArticlePayload, Credentials, PublishResult};

/// A single browser tab driven by the publisher.
///
/// Every step of a publish attempt goes through this seam, which keeps the
/// auth state machine, injector and resolver testable without Chromium.
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the document to load.
    fn goto(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// The location the tab is currently at.
    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Wait until `selector` is present and visible. `Ok(false)` on timeout.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Replace the value of an input and fire `input`/`change` events.
    fn fill(&self, selector: &str, value: &str)
    -> impl Future<Output = Result<(), AppError>> + Send;

    fn click(&self, selector: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait for an in-flight navigation to settle.
    fn wait_for_navigation(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn select_option(
        &self,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Attach a local file to a file input. `Ok(false)` if the input is missing.
    fn upload_file(
        &self,
        selector: &str,
        path: &Path,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Call a JavaScript function expression with one JSON argument in the page.
    fn call_function(
        &self,
        function: &str,
        arg: serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    /// Release the tab and its browser. Must be safe to call more than once.
    fn close(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Opens a fresh, isolated browser session for one publish attempt.
pub trait BrowserLauncher: Send + Sync {
    type Page: PageDriver;

    fn launch(&self) -> impl Future<Output = Result<Self::Page, AppError>> + Send;
}

/// Minimal HTTP client used by the image providers.
pub trait HttpClient: Send + Sync + Clone {
    /// GET a binary body. Non-2xx responses are errors.
    fn get_bytes(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;

    /// GET and decode a JSON body. Non-2xx responses are errors.
    fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}

/// Known rate-limit placeholder hashes.
///
/// Append-only: adding a present hash is a no-op, hashes are never removed.
pub trait FingerprintStore: Send + Sync + Clone {
    fn contains(&self, hash: &str) -> bool;

    /// Add a hash. Returns true if it was not already present.
    fn add(&self, hash: &str) -> bool;

    /// Write the current set back to durable storage.
    fn persist(&self) -> Result<(), AppError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything that can take one article live with one account.
///
/// The batch runner depends on this rather than on a concrete publisher.
pub trait ArticlePublisher: Send + Sync {
    fn publish(
        &self,
        article: &ArticlePayload,
        credentials: &Credentials,
    ) -> impl Future<Output = PublishResult> + Send;
}
