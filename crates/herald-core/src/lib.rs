pub mod config;
pub mod error;
pub mod image;
pub mod injector;
pub mod models;
pub mod navigation;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod runner;
pub mod sanitize;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use config::{CmsConfig, ImageConfig, PublisherConfig};
pub use error::AppError;
pub use image::ImagePipeline;
pub use models::{ArticlePayload, Credentials, ImageCandidate, PublishResult, compute_hash};
pub use publisher::Publisher;
pub use queue::{ItemStatus, QueueItem, WorkQueue};
pub use registry::FingerprintRegistry;
pub use retry::RetryPolicy;
pub use runner::{BatchRunner, RunSummary, RunnerConfig, TracingRunnerReporter};
pub use traits::{ArticlePublisher, BrowserLauncher, FingerprintStore, HttpClient, PageDriver};
