use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::Credentials;
use crate::queue::{QueueItem, WorkQueue};
use crate::traits::ArticlePublisher;

/// Batch pacing and size.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum items fetched from the queue per run.
    pub limit: usize,
    /// Pause between published items.
    pub delay: Duration,
    /// Maximum random jitter added to `delay` (uniform [0, jitter]).
    pub jitter: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            limit: 2,
            delay: Duration::from_secs(5),
            jitter: Duration::from_secs(10),
        }
    }
}

impl RunnerConfig {
    fn pause(&self) -> Duration {
        self.delay + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Events emitted by the runner for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RunnerEvent<'a> {
    Started { items: usize },
    ItemSkipped { id: &'a str, reason: &'a str },
    ItemStarted { id: &'a str, title: &'a str, account: &'a str },
    ItemPublished { id: &'a str, url: &'a str },
    ItemFailed { id: &'a str },
    Cancelled { remaining: usize },
    Finished { summary: &'a RunSummary },
}

/// Trait for receiving runner events (decoupled logging).
pub trait RunnerReporter: Send + Sync {
    fn report(&self, event: RunnerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunnerReporter;

impl RunnerReporter for TracingRunnerReporter {
    fn report(&self, event: RunnerEvent<'_>) {
        match event {
            RunnerEvent::Started { items } => {
                tracing::info!(%items, "Batch started");
            }
            RunnerEvent::ItemSkipped { id, reason } => {
                tracing::info!(%id, %reason, "Item skipped");
            }
            RunnerEvent::ItemStarted { id, title, account } => {
                tracing::info!(%id, %title, %account, "Publishing item");
            }
            RunnerEvent::ItemPublished { id, url } => {
                tracing::info!(%id, %url, "Item published");
            }
            RunnerEvent::ItemFailed { id } => {
                tracing::warn!(%id, "Item failed");
            }
            RunnerEvent::Cancelled { remaining } => {
                tracing::info!(%remaining, "Batch cancelled");
            }
            RunnerEvent::Finished { summary } => {
                tracing::info!(
                    published = summary.published,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "Batch finished"
                );
            }
        }
    }
}

/// Drains ready items from a work queue through a publisher, rotating accounts.
pub struct BatchRunner<Q: WorkQueue, P: ArticlePublisher> {
    queue: Q,
    publisher: P,
    accounts: Vec<Credentials>,
    config: RunnerConfig,
}

impl<Q: WorkQueue, P: ArticlePublisher> BatchRunner<Q, P> {
    pub fn new(queue: Q, publisher: P, accounts: Vec<Credentials>, config: RunnerConfig) -> Self {
        Self {
            queue,
            publisher,
            accounts,
            config,
        }
    }

    /// Process one batch. Cancellation is checked between items only.
    pub async fn run<RR: RunnerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &RR,
    ) -> Result<RunSummary, AppError> {
        if self.accounts.is_empty() {
            return Err(AppError::Generic("no publishing accounts configured".into()));
        }

        let items = self.queue.fetch_ready(self.config.limit).await?;
        reporter.report(RunnerEvent::Started { items: items.len() });

        let mut summary = RunSummary::default();
        let mut attempts = 0usize;

        for (idx, item) in items.iter().enumerate() {
            if cancel_token.is_cancelled() {
                reporter.report(RunnerEvent::Cancelled {
                    remaining: items.len() - idx,
                });
                break;
            }

            if !self.precheck(item, &mut summary, reporter).await {
                continue;
            }

            if attempts > 0 {
                tokio::select! {
                    () = tokio::time::sleep(self.config.pause()) => {}
                    () = cancel_token.cancelled() => {
                        reporter.report(RunnerEvent::Cancelled {
                            remaining: items.len() - idx,
                        });
                        break;
                    }
                }
            }

            let account = &self.accounts[attempts % self.accounts.len()];
            attempts += 1;
            reporter.report(RunnerEvent::ItemStarted {
                id: &item.id,
                title: &item.article.title,
                account: &account.username,
            });

            let result = self.publisher.publish(&item.article, account).await;
            if result.success {
                if let Err(e) = self.queue.mark_published(&item.id, &result.url, Utc::now()).await {
                    tracing::error!(id = %item.id, error = %e, "Failed to mark item published");
                }
                reporter.report(RunnerEvent::ItemPublished {
                    id: &item.id,
                    url: &result.url,
                });
                summary.published += 1;
            } else {
                if let Err(e) = self.queue.mark_failed(&item.id, "publish failed").await {
                    tracing::error!(id = %item.id, error = %e, "Failed to record failure");
                }
                reporter.report(RunnerEvent::ItemFailed { id: &item.id });
                summary.failed += 1;
            }
        }

        reporter.report(RunnerEvent::Finished { summary: &summary });
        Ok(summary)
    }

    /// Queue-side checks before spending a browser session. Returns true if
    /// the item should be published.
    async fn precheck<RR: RunnerReporter>(
        &self,
        item: &QueueItem,
        summary: &mut RunSummary,
        reporter: &RR,
    ) -> bool {
        if let Some(url) = item.recorded_url() {
            if !item.is_stale() {
                if let Err(e) = self
                    .queue
                    .mark_published(&item.id, url, item.published_at.unwrap_or_else(Utc::now))
                    .await
                {
                    tracing::error!(id = %item.id, error = %e, "Failed to restore published status");
                }
                reporter.report(RunnerEvent::ItemSkipped {
                    id: &item.id,
                    reason: "already published",
                });
                summary.skipped += 1;
                return false;
            }
            tracing::info!(id = %item.id, %url, "Content regenerated since last publish, republishing");
        }

        if !item.has_valid_content() {
            if let Err(e) = self.queue.reset_to_ready(&item.id).await {
                tracing::error!(id = %item.id, error = %e, "Failed to reset item");
            }
            reporter.report(RunnerEvent::ItemSkipped {
                id: &item.id,
                reason: "invalid content",
            });
            summary.skipped += 1;
            return false;
        }

        true
    }
}

/// Generate a pseudo-random jitter value in [0, max_ms).
///
/// Uses a simple xorshift on the current time's nanoseconds. Not
/// cryptographically secure, but adequate for pacing.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
