use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::ArticlePayload;

/// Minimum body length for an item to be considered publishable.
pub const MIN_BODY_CHARS: usize = 50;

/// Lifecycle of an item in the external work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Waiting for content generation.
    Ready,
    /// Content generated, waiting to be published.
    Pending,
    Published,
}

/// One item handed out by the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub article: ArticlePayload,
    /// URL recorded by an earlier publish, if any.
    #[serde(default)]
    pub existing_url: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// A title and a body of at least [`MIN_BODY_CHARS`] characters.
    pub fn has_valid_content(&self) -> bool {
        !self.article.title.trim().is_empty()
            && self.article.body_markup.trim().chars().count() >= MIN_BODY_CHARS
    }

    /// The previously recorded URL, if it looks like one.
    pub fn recorded_url(&self) -> Option<&str> {
        self.existing_url
            .as_deref()
            .map(str::trim)
            .filter(|u| u.starts_with("http"))
    }

    /// Content regenerated after the recorded publish, so the URL is outdated.
    ///
    /// No publish time means stale; no generation time means old content.
    pub fn is_stale(&self) -> bool {
        match (self.generated_at, self.published_at) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(generated), Some(published)) => generated > published,
        }
    }
}

/// External work queue (spreadsheet, database, file) owning item status.
pub trait WorkQueue: Send + Sync {
    /// Items whose content is ready to publish, oldest first.
    fn fetch_ready(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<QueueItem>, AppError>> + Send;

    fn mark_published(
        &self,
        id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Record a failed attempt. The item stays eligible.
    fn mark_failed(
        &self,
        id: &str,
        reason: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Send an item back for content regeneration.
    fn reset_to_ready(&self, id: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}
