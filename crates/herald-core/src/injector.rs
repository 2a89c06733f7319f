//! Compose-form population.
//!
//! The body goes through an ordered list of editor strategies until one is
//! verified, then the hidden backing field is written exactly once right
//! before the submit click. The editor is known to desync from that field,
//! so the final write happens whatever the strategies reported.

use std::io::Write;
use std::sync::Mutex;

use serde_json::{Value, json};

use crate::config::PublisherConfig;
use crate::error::AppError;
use crate::image::ImagePipeline;
use crate::models::{ArticlePayload, ImageCandidate};
use crate::sanitize::sanitize_body;
use crate::session::settle;
use crate::traits::{FingerprintStore, HttpClient, PageDriver};

/// `UM`/`UE` editor API: set, sync, then read back for a length check.
pub(crate) const EDITOR_API_SCRIPT: &str = r#"(args) => {
  const lookup = (ns) => (window[ns] && typeof window[ns].getEditor === 'function') ? window[ns].getEditor(args.editorId) : null;
  const editor = lookup('UM') || lookup('UE');
  if (!editor || typeof editor.setContent !== 'function') return { supported: false };
  editor.setContent(args.html);
  if (typeof editor.sync === 'function') editor.sync();
  const content = typeof editor.getContent === 'function' ? editor.getContent() : '';
  return { supported: true, length: content.length };
}"#;

/// Write the editor iframe's body directly, then ask the editor to sync.
pub(crate) const FRAME_SCRIPT: &str = r#"(args) => {
  const frame = Array.from(document.querySelectorAll('iframe'))
    .find((f) => /ueditor|message/i.test((f.name || '') + ' ' + (f.id || '')));
  if (!frame) return { supported: false };
  let doc = null;
  try { doc = frame.contentDocument || (frame.contentWindow && frame.contentWindow.document); } catch (e) { doc = null; }
  if (!doc || !doc.body) return { supported: false };
  doc.body.innerHTML = args.html;
  for (const ns of ['UM', 'UE']) {
    const api = window[ns];
    const editor = api && typeof api.getEditor === 'function' ? api.getEditor(args.editorId) : null;
    if (editor && typeof editor.sync === 'function') { editor.sync(); break; }
  }
  return { supported: true, length: doc.body.innerHTML.length };
}"#;

/// Assign the hidden textarea the editor mirrors into.
pub(crate) const RAW_FIELD_SCRIPT: &str = r#"(args) => {
  const field = document.querySelector(args.selector);
  if (!field) return { found: false };
  field.value = args.html;
  field.dispatchEvent(new Event('input', { bubbles: true }));
  field.dispatchEvent(new Event('change', { bubbles: true }));
  return { found: true, length: field.value.length };
}"#;

/// Tick a checkbox if present and unticked.
pub(crate) const CHECKBOX_SCRIPT: &str = r#"(args) => {
  const box = document.querySelector(args.selector);
  if (!box) return false;
  if (!box.checked) box.click();
  return !!box.checked;
}"#;

/// Rich-text strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStrategy {
    EditorApi,
    DirectFrame,
}

impl EditorStrategy {
    pub const ORDER: [EditorStrategy; 2] = [EditorStrategy::EditorApi, EditorStrategy::DirectFrame];

    fn script(self) -> &'static str {
        match self {
            EditorStrategy::EditorApi => EDITOR_API_SCRIPT,
            EditorStrategy::DirectFrame => FRAME_SCRIPT,
        }
    }
}

/// What one strategy attempt reported.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// Content went in and read back at an acceptable length.
    Accepted { length: u64 },
    /// This editor shape is not on the page.
    Unsupported,
    /// The strategy ran but could not be verified.
    Rejected { reason: String },
    /// The script call itself errored.
    Failed { reason: String, retryable: bool },
}

impl StrategyOutcome {
    /// Interpret a strategy script's `{supported, length}` result.
    fn from_result(value: &Value, expected_len: usize, min_ratio: f64) -> Self {
        if value.get("supported").and_then(Value::as_bool) != Some(true) {
            return StrategyOutcome::Unsupported;
        }
        let length = value.get("length").and_then(Value::as_u64).unwrap_or(0);
        if expected_len == 0 || length as f64 >= expected_len as f64 * min_ratio {
            StrategyOutcome::Accepted { length }
        } else {
            StrategyOutcome::Rejected {
                reason: format!("round-trip truncated to {length} of {expected_len}"),
            }
        }
    }
}

/// A sanitized body plus the record of how it got into the editor.
///
/// Consumed by [`ContentInjector::submit`], which performs the single
/// raw-field write.
#[derive(Debug, Clone)]
pub struct PreparedBody {
    html: String,
    pub attempts: Vec<(EditorStrategy, StrategyOutcome)>,
}

impl PreparedBody {
    pub fn html(&self) -> &str {
        &self.html
    }

    /// The strategy that was verified, if any.
    pub fn accepted_by(&self) -> Option<EditorStrategy> {
        self.attempts
            .iter()
            .find(|(_, o)| matches!(o, StrategyOutcome::Accepted { .. }))
            .map(|(s, _)| *s)
    }
}

/// Fills the compose page of an authenticated session.
pub struct ContentInjector<'a, P: PageDriver> {
    page: &'a P,
    config: &'a PublisherConfig,
}

impl<'a, P: PageDriver> ContentInjector<'a, P> {
    pub fn new(page: &'a P, config: &'a PublisherConfig) -> Self {
        Self { page, config }
    }

    /// Title, category, SEO fields, tags and the comments checkbox.
    ///
    /// Only the title is required; a missing title field means the compose
    /// page did not load.
    pub async fn fill_fields(&self, article: &ArticlePayload) -> Result<(), AppError> {
        let selectors = &self.config.selectors;

        self.page
            .fill(&selectors.title, &article.title)
            .await
            .map_err(|e| match e {
                AppError::ElementNotFound(_) => AppError::NavigationError {
                    url: self.config.cms.compose_url.clone(),
                    message: "compose form title field missing".into(),
                },
                other => other,
            })?;

        self.select_category(&article.category_id).await;

        for (selector, value) in [
            (&selectors.summary, &article.summary),
            (&selectors.keywords, &article.keywords),
            (&selectors.description, &article.description),
            (&selectors.tags, &article.tags),
        ] {
            if value.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.page.fill(selector, value).await {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!(%selector, error = %e, "Optional field not filled");
            }
        }

        if self.config.disable_comments {
            let ticked = self
                .page
                .call_function(CHECKBOX_SCRIPT, json!({ "selector": selectors.disable_comments }))
                .await;
            if let Err(e) = ticked {
                tracing::debug!(error = %e, "Comments checkbox not toggled");
            }
        }

        tracing::debug!(title = %article.title, "Form fields filled");
        Ok(())
    }

    async fn select_category(&self, requested: &str) {
        let selector = &self.config.selectors.category;
        let categories = &self.config.categories;
        let id = categories.resolve(requested);
        if id == categories.default_id() && !requested.trim().is_empty() {
            tracing::warn!(category = %requested, default = %id, "Unknown category, using default");
        }

        if let Err(e) = self.page.select_option(selector, id).await {
            tracing::warn!(category = %id, error = %e, "Category select failed");
            if id != categories.default_id()
                && let Err(e) = self.page.select_option(selector, categories.default_id()).await
            {
                tracing::warn!(error = %e, "Default category select failed");
            }
        }
    }

    /// Sanitize the body and push it through the editor strategies.
    ///
    /// Stops at the first verified strategy. A pass in which every strategy
    /// failed on a transient error is repeated under `injection_retry`.
    /// Never fails on strategy errors alone, since the raw-field write at
    /// submit is the safety net.
    pub async fn inject_body(&self, body_markup: &str) -> Result<PreparedBody, AppError> {
        let html = sanitize_body(body_markup);
        if html.len() != body_markup.len() {
            tracing::info!(
                removed = body_markup.chars().count() - html.chars().count(),
                "Stripped characters outside the BMP"
            );
        }
        let expected = html.chars().count();
        let arg = json!({ "editorId": self.config.selectors.editor_id, "html": html });
        let last_pass = Mutex::new(Vec::new());

        let (arg_ref, last_ref) = (&arg, &last_pass);
        let result = self
            .config
            .injection_retry
            .run("inject body", move |attempt| async move {
                let attempts = self.strategy_pass(arg_ref, expected).await?;
                let verified = attempts
                    .iter()
                    .any(|(_, o)| matches!(o, StrategyOutcome::Accepted { .. }));
                let transient = attempts.iter().find_map(|(_, o)| match o {
                    StrategyOutcome::Failed { reason, retryable: true } => Some(reason.clone()),
                    _ => None,
                });
                *last_ref.lock().unwrap_or_else(|e| e.into_inner()) = attempts.clone();
                match transient {
                    Some(reason) if !verified => {
                        tracing::debug!(attempt, %reason, "Editor pass failed transiently");
                        Err(AppError::Anomaly(format!("editor pass failed: {reason}")))
                    }
                    _ => Ok(attempts),
                }
            })
            .await;

        let attempts = match result {
            Ok(attempts) => attempts,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Editor strategies kept failing");
                last_pass.into_inner().unwrap_or_else(|e| e.into_inner())
            }
        };

        let prepared = PreparedBody { html, attempts };
        match prepared.accepted_by() {
            Some(strategy) => tracing::info!(?strategy, "Body injected"),
            None => tracing::warn!("No editor strategy verified, relying on raw field"),
        }
        Ok(prepared)
    }

    /// One run over [`EditorStrategy::ORDER`], stopping at the first accepted strategy.
    async fn strategy_pass(
        &self,
        arg: &Value,
        expected: usize,
    ) -> Result<Vec<(EditorStrategy, StrategyOutcome)>, AppError> {
        let mut attempts = Vec::with_capacity(EditorStrategy::ORDER.len());
        for strategy in EditorStrategy::ORDER {
            let outcome = match self.page.call_function(strategy.script(), arg.clone()).await {
                Ok(value) => StrategyOutcome::from_result(&value, expected, self.config.min_roundtrip_ratio),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => StrategyOutcome::Failed {
                    retryable: e.is_retryable(),
                    reason: e.to_string(),
                },
            };
            tracing::debug!(?strategy, ?outcome, "Editor strategy tried");
            let accepted = matches!(outcome, StrategyOutcome::Accepted { .. });
            attempts.push((strategy, outcome));
            if accepted {
                break;
            }
        }
        Ok(attempts)
    }

    /// Resolve the body's image through `images` and attach it as the cover.
    ///
    /// Returns whether a cover was uploaded. Missing images never fail the form.
    pub async fn attach_cover<H, R>(
        &self,
        article: &ArticlePayload,
        images: &ImagePipeline<H, R>,
    ) -> Result<bool, AppError>
    where
        H: HttpClient,
        R: FingerprintStore,
    {
        let Some(source_url) = article.cover_image_url() else {
            return Ok(false);
        };
        let Some(image) = images
            .acquire_cover_image(&source_url, &article.keywords)
            .await
        else {
            tracing::warn!("Publishing without a cover image");
            return Ok(false);
        };
        match self.upload_cover(&image).await {
            Ok(uploaded) => Ok(uploaded),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Cover not attached, publishing without it");
                Ok(false)
            }
        }
    }

    /// Upload image bytes through the cover file input via a temporary file.
    ///
    /// The file is removed when this returns, on every path.
    pub async fn upload_cover(&self, image: &ImageCandidate) -> Result<bool, AppError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("herald-cover-").suffix(".jpg");
        let created = match &self.config.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file = created.map_err(|e| AppError::Generic(format!("cover temp file: {e}")))?;
        file.write_all(&image.bytes)
            .and_then(|()| file.flush())
            .map_err(|e| AppError::Generic(format!("cover temp file: {e}")))?;

        let uploaded = match self
            .page
            .upload_file(&self.config.selectors.cover_input, file.path())
            .await
        {
            Ok(uploaded) => uploaded,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Cover upload failed");
                false
            }
        };

        if uploaded {
            tracing::info!(provider = %image.source, size = image.bytes.len(), "Cover uploaded");
            settle(self.config.timings.settle).await;
        } else {
            tracing::warn!(selector = %self.config.selectors.cover_input, "Cover input not found");
        }
        Ok(uploaded)
    }

    /// Final raw-field write, submit click and navigation wait.
    ///
    /// A navigation timeout after the click is tolerated; the resolver
    /// decides where the item ended up.
    pub async fn submit(&self, body: PreparedBody) -> Result<(), AppError> {
        let selectors = &self.config.selectors;

        match self
            .page
            .call_function(
                RAW_FIELD_SCRIPT,
                json!({ "selector": selectors.body_field, "html": body.html }),
            )
            .await
        {
            Ok(v) if v.get("found").and_then(Value::as_bool) == Some(true) => {
                tracing::debug!(length = v["length"].as_u64().unwrap_or(0), "Raw body field synced");
            }
            Ok(_) => tracing::warn!(selector = %selectors.body_field, "Raw body field not found"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!(error = %e, "Raw body field write failed"),
        }

        self.page.click(&selectors.submit).await?;
        match self
            .page
            .wait_for_navigation(self.config.timings.submit_timeout)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!(error = %e, "No navigation after submit, continuing"),
        }
        settle(self.config.timings.settle).await;
        tracing::info!("Compose form submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{CmsConfig, ImageConfig, Timings};
    use crate::registry::FingerprintRegistry;
    use crate::retry::RetryPolicy;
    use crate::testutil::{Call, MockHttp, MockPage, image_bytes};

    const BODY: &str = "<p>Kraft paper boxes are the default for 🎁 gift packaging and shipping.</p>";

    fn config() -> PublisherConfig {
        PublisherConfig::new(CmsConfig::from_base_url("https://cms.test"))
            .with_timings(Timings::immediate())
            .with_injection_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    fn scripts(page: &MockPage) -> Vec<String> {
        page.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Script(s, _) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn body_len() -> u64 {
        sanitize_body(BODY).chars().count() as u64
    }

    #[test]
    fn strategy_outcomes() {
        assert_eq!(
            StrategyOutcome::from_result(&json!({"supported": false}), 100, 0.5),
            StrategyOutcome::Unsupported
        );
        assert_eq!(StrategyOutcome::from_result(&Value::Null, 100, 0.5), StrategyOutcome::Unsupported);
        assert_eq!(
            StrategyOutcome::from_result(&json!({"supported": true, "length": 60}), 100, 0.5),
            StrategyOutcome::Accepted { length: 60 }
        );
        assert!(matches!(
            StrategyOutcome::from_result(&json!({"supported": true, "length": 10}), 100, 0.5),
            StrategyOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn editor_api_success_stops_further_strategies() {
        let config = config();
        let page = MockPage::new();
        page.on_script(EDITOR_API_SCRIPT, json!({"supported": true, "length": body_len()}));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();

        assert_eq!(prepared.accepted_by(), Some(EditorStrategy::EditorApi));
        assert_eq!(scripts(&page), vec![EDITOR_API_SCRIPT.to_string()]);
    }

    #[tokio::test]
    async fn transient_editor_failure_repeats_the_pass() {
        let config = config();
        let page = MockPage::new();
        page.fail_script(EDITOR_API_SCRIPT, AppError::Timeout(5));
        page.on_script(EDITOR_API_SCRIPT, json!({"supported": true, "length": body_len()}));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();

        assert_eq!(prepared.accepted_by(), Some(EditorStrategy::EditorApi));
        assert_eq!(
            scripts(&page),
            vec![
                EDITOR_API_SCRIPT.to_string(),
                FRAME_SCRIPT.to_string(),
                EDITOR_API_SCRIPT.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_editor_retries_still_reach_submit() {
        let config = config().with_injection_retry(RetryPolicy::new(2, Duration::ZERO));
        let page = MockPage::new();
        page.fail_script(EDITOR_API_SCRIPT, AppError::NetworkError("reset".into()));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();

        assert_eq!(prepared.accepted_by(), None);
        assert!(matches!(
            prepared.attempts[0].1,
            StrategyOutcome::Failed { retryable: true, .. }
        ));
        assert_eq!(scripts(&page).len(), 4);

        injector.submit(prepared).await.unwrap();
        assert!(page.calls().contains(&Call::Click(config.selectors.submit.clone())));
    }

    #[tokio::test]
    async fn permanent_script_error_is_not_repeated() {
        let config = config();
        let page = MockPage::new();
        page.fail_script(EDITOR_API_SCRIPT, AppError::ElementNotFound("#editor".into()));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();

        assert_eq!(prepared.accepted_by(), None);
        assert_eq!(scripts(&page).len(), 2);
    }

    #[tokio::test]
    async fn fatal_script_error_aborts_injection() {
        let config = config();
        let page = MockPage::new();
        page.fail_script(EDITOR_API_SCRIPT, AppError::BrowserError("tab crashed".into()));
        let injector = ContentInjector::new(&page, &config);

        let err = injector.inject_body(BODY).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(scripts(&page).len(), 1);
    }

    #[tokio::test]
    async fn truncated_round_trip_falls_back_to_frame() {
        let config = config();
        let page = MockPage::new();
        page.on_script(EDITOR_API_SCRIPT, json!({"supported": true, "length": 5}));
        page.on_script(FRAME_SCRIPT, json!({"supported": true, "length": body_len()}));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();

        assert_eq!(prepared.accepted_by(), Some(EditorStrategy::DirectFrame));
        assert!(matches!(prepared.attempts[0].1, StrategyOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn every_strategy_sees_sanitized_body() {
        let config = config();
        let page = MockPage::new();
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body(BODY).await.unwrap();
        injector.submit(prepared).await.unwrap();

        let htmls: Vec<String> = page
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Script(_, arg) => arg["html"].as_str().map(String::from),
                _ => None,
            })
            .collect();
        assert_eq!(htmls.len(), 3);
        for html in htmls {
            assert!(!html.contains('🎁'));
            assert!(html.ends_with("shipping.</p>"));
        }
    }

    #[tokio::test]
    async fn raw_field_written_once_after_strategies_whatever_they_report() {
        let cases = [
            vec![(EDITOR_API_SCRIPT, json!({"supported": true, "length": body_len()}))],
            vec![(FRAME_SCRIPT, json!({"supported": true, "length": body_len()}))],
            vec![],
        ];
        for responses in cases {
            let config = config();
            let page = MockPage::new();
            for (script, value) in responses {
                page.on_script(script, value);
            }
            let injector = ContentInjector::new(&page, &config);

            let prepared = injector.inject_body(BODY).await.unwrap();
            injector.submit(prepared).await.unwrap();

            let calls = page.calls();
            let raw_positions: Vec<usize> = calls
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c, Call::Script(s, _) if s == RAW_FIELD_SCRIPT))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(raw_positions.len(), 1);
            let last_strategy = calls
                .iter()
                .rposition(|c| matches!(c, Call::Script(s, _) if s == EDITOR_API_SCRIPT || s == FRAME_SCRIPT))
                .unwrap();
            let submit = calls
                .iter()
                .position(|c| *c == Call::Click("#submit".into()))
                .unwrap();
            assert!(last_strategy < raw_positions[0]);
            assert!(raw_positions[0] < submit);
        }
    }

    #[tokio::test]
    async fn unknown_category_uses_default() {
        let config = config();
        let page = MockPage::new();
        let injector = ContentInjector::new(&page, &config);
        let article = ArticlePayload {
            title: "Custom mailer boxes".into(),
            category_id: "gardening".into(),
            summary: "short".into(),
            ..Default::default()
        };

        injector.fill_fields(&article).await.unwrap();

        let calls = page.calls();
        assert!(calls.contains(&Call::Select("select[name=\"fid\"]".into(), "0".into())));
        assert!(calls.contains(&Call::Fill("#brief".into(), "short".into())));
        assert!(!calls.iter().any(|c| matches!(c, Call::Fill(s, _) if s == "#tags")));
    }

    #[tokio::test]
    async fn failed_category_select_retries_default() {
        let config = config();
        let page = MockPage::new();
        page.fail_select("2");
        let injector = ContentInjector::new(&page, &config);
        let article = ArticlePayload {
            title: "t".into(),
            category_id: "行业资讯".into(),
            ..Default::default()
        };

        injector.fill_fields(&article).await.unwrap();

        assert!(page.calls().contains(&Call::Select("select[name=\"fid\"]".into(), "0".into())));
    }

    #[tokio::test]
    async fn missing_title_is_fatal_to_form() {
        let config = config();
        let page = MockPage::new();
        page.set_missing("#subject");
        let injector = ContentInjector::new(&page, &config);

        let err = injector
            .fill_fields(&ArticlePayload {
                title: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NavigationError { .. }));
    }

    #[tokio::test]
    async fn cover_temp_file_is_removed_after_upload() {
        let config = config();
        let page = MockPage::new();
        let injector = ContentInjector::new(&page, &config);
        let image = ImageCandidate {
            bytes: vec![7u8; 20_000],
            source: "pexels".into(),
        };

        assert!(injector.upload_cover(&image).await.unwrap());

        let uploads = page.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].existed_during_upload);
        assert_eq!(uploads[0].size, 20_000);
        assert!(!uploads[0].path.exists());
    }

    #[tokio::test]
    async fn cover_temp_file_failure_publishes_without_cover() {
        let dir = tempfile::tempdir().unwrap();
        let config = config().with_scratch_dir(dir.path().join("gone"));
        let page = MockPage::new();
        let http = MockHttp::new();
        http.on_bytes("https://images.test/cover.jpg", Ok(image_bytes(20_000, 3)));
        let images = ImagePipeline::new(
            http,
            FingerprintRegistry::in_memory(),
            ImageConfig {
                retry: RetryPolicy::none(),
                ..ImageConfig::default()
            },
        );
        let article = ArticlePayload {
            title: "Mailers".into(),
            body_markup: r#"<p>Mailer boxes.</p><img src="https://images.test/cover.jpg" />"#.into(),
            category_id: String::new(),
            summary: String::new(),
            keywords: "mailer".into(),
            description: String::new(),
            tags: String::new(),
        };
        let injector = ContentInjector::new(&page, &config);

        let image = ImageCandidate {
            bytes: vec![7u8; 20_000],
            source: "pexels".into(),
        };
        let err = injector.upload_cover(&image).await.unwrap_err();
        assert!(!err.is_fatal());

        assert!(!injector.attach_cover(&article, &images).await.unwrap());
        assert!(page.uploads().is_empty());
    }

    #[tokio::test]
    async fn scratch_dir_holds_cover_during_upload() {
        let dir = tempfile::tempdir().unwrap();
        let config = config().with_scratch_dir(dir.path());
        let page = MockPage::new();
        let injector = ContentInjector::new(&page, &config);
        let image = ImageCandidate {
            bytes: vec![7u8; 20_000],
            source: "pexels".into(),
        };

        assert!(injector.upload_cover(&image).await.unwrap());
        assert!(page.uploads()[0].path.starts_with(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_cover_input_is_not_fatal() {
        let config = config();
        let page = MockPage::new();
        page.set_missing("input[data-assoc=\"img_1\"]");
        let injector = ContentInjector::new(&page, &config);
        let image = ImageCandidate {
            bytes: vec![1u8; 20_000],
            source: "generative".into(),
        };

        assert!(!injector.upload_cover(&image).await.unwrap());
        assert!(!page.uploads()[0].path.exists());
    }

    #[tokio::test]
    async fn submit_tolerates_navigation_timeout() {
        let config = config();
        let page = MockPage::new();
        page.fail_navigation_wait(AppError::Timeout(60));
        let injector = ContentInjector::new(&page, &config);

        let prepared = injector.inject_body("<p>body</p>").await.unwrap();
        injector.submit(prepared).await.unwrap();
    }
}
