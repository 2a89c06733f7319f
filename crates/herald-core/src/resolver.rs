//! Recovers the canonical public URL of a freshly submitted item.
//!
//! The page reached after submit is not trustworthy, so the admin listing
//! (newest first) is scanned for the top row's content id. The listing can lag
//! behind the write, hence polls within a scan and whole-scan retries.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use crate::config::PublisherConfig;
use crate::navigation::navigate;
use crate::traits::PageDriver;

static TID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tid=(\d+)").expect("valid tid pattern"));

/// Collect same-origin documents breadth-first, then look for the first row
/// with a content id. Falls back to up to five `tid=` links per document.
pub(crate) const LISTING_SCAN_SCRIPT: &str = r#"(_args) => {
  const docs = [document];
  for (let i = 0; i < docs.length; i++) {
    for (const frame of docs[i].querySelectorAll('iframe, frame')) {
      try { if (frame.contentDocument) docs.push(frame.contentDocument); } catch (e) {}
    }
  }
  for (const doc of docs) {
    const row = doc.querySelector('tr[data-tid]');
    if (row) return { tid: row.getAttribute('data-tid'), hrefs: [] };
  }
  const hrefs = [];
  for (const doc of docs) {
    for (const a of Array.from(doc.querySelectorAll("a[href*='tid=']")).slice(0, 5)) {
      hrefs.push(a.getAttribute('href') || '');
    }
  }
  return { tid: null, hrefs };
}"#;

/// Where the submitted item was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical URL built from the listing's content id.
    Canonical { id: String, url: String },
    /// The id could not be found; whatever the tab is showing.
    BestEffort { url: String },
}

impl Resolution {
    pub fn url(&self) -> &str {
        match self {
            Resolution::Canonical { url, .. } | Resolution::BestEffort { url } => url,
        }
    }

    pub fn into_url(self) -> String {
        match self {
            Resolution::Canonical { url, .. } | Resolution::BestEffort { url } => url,
        }
    }
}

pub struct ResultResolver<'a, P: PageDriver> {
    page: &'a P,
    config: &'a PublisherConfig,
}

impl<'a, P: PageDriver> ResultResolver<'a, P> {
    pub fn new(page: &'a P, config: &'a PublisherConfig) -> Self {
        Self { page, config }
    }

    /// Never fails: an unresolved id degrades to the current location.
    pub async fn resolve(&self) -> Resolution {
        let resolver = &self.config.resolver;
        let listing_url = &self.config.cms.listing_url;

        for attempt in 0..resolver.attempts {
            if attempt > 0 {
                tokio::time::sleep(resolver.retry_delay).await;
            }
            if let Err(e) = navigate(self.page, listing_url, &self.config.navigation_retry).await {
                tracing::warn!(attempt = attempt + 1, error = %e, "Listing page unreachable");
                continue;
            }
            if let Some(id) = self.scan().await {
                let url = self.config.cms.canonical_url(&id);
                tracing::info!(%id, %url, "Canonical URL resolved");
                return Resolution::Canonical { id, url };
            }
            tracing::debug!(attempt = attempt + 1, "No content id in listing yet");
        }

        let url = self.page.current_url().await.unwrap_or_default();
        tracing::warn!(%url, "Content id not found, using current location");
        Resolution::BestEffort { url }
    }

    /// Poll the listing a few times within one scan attempt.
    async fn scan(&self) -> Option<String> {
        let resolver = &self.config.resolver;
        for poll in 0..resolver.polls.max(1) {
            if poll > 0 {
                tokio::time::sleep(resolver.poll_interval).await;
            }
            match self.page.call_function(LISTING_SCAN_SCRIPT, json!({})).await {
                Ok(value) => {
                    if let Some(id) = extract_content_id(&value) {
                        return Some(id);
                    }
                }
                Err(e) => tracing::debug!(poll, error = %e, "Listing scan failed"),
            }
        }
        None
    }
}

/// Pull a numeric content id out of a scan result.
pub fn extract_content_id(scan: &Value) -> Option<String> {
    if let Some(tid) = scan.get("tid").and_then(Value::as_str).map(str::trim)
        && is_content_id(tid)
    {
        return Some(tid.to_string());
    }
    scan.get("hrefs")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .find_map(|href| TID_PARAM.captures(href).map(|c| c[1].to_string()))
}

fn is_content_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
