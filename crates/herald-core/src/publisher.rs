use crate::config::PublisherConfig;
use crate::error::AppError;
use crate::image::ImagePipeline;
use crate::injector::ContentInjector;
use crate::models::{ArticlePayload, Credentials, PublishResult};
use crate::navigation::navigate;
use crate::resolver::{Resolution, ResultResolver};
use crate::session::{Session, settle};
use crate::traits::{ArticlePublisher, BrowserLauncher, FingerprintStore, HttpClient};

/// Orchestrates one publish attempt: launch → authenticate → compose →
/// cover → submit → resolve → teardown.
///
/// Generic over the browser and HTTP stacks so the whole flow runs against
/// mocks in tests. Each call owns a fresh browser session; the image
/// pipeline (and its per-run memory) is shared across calls.
pub struct Publisher<L, H, R>
where
    L: BrowserLauncher,
    H: HttpClient,
    R: FingerprintStore,
{
    launcher: L,
    images: ImagePipeline<H, R>,
    config: PublisherConfig,
}

impl<L, H, R> Publisher<L, H, R>
where
    L: BrowserLauncher,
    H: HttpClient,
    R: FingerprintStore,
{
    pub fn new(launcher: L, images: ImagePipeline<H, R>, config: PublisherConfig) -> Self {
        Self {
            launcher,
            images,
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn images(&self) -> &ImagePipeline<H, R> {
        &self.images
    }

    /// Publish `article` with `credentials`.
    ///
    /// Never returns an error: every failure is logged and reported as
    /// `success = false`. The browser is closed on every path.
    pub async fn publish(&self, article: &ArticlePayload, credentials: &Credentials) -> PublishResult {
        tracing::info!(title = %article.title, user = %credentials.username, "Publishing article");

        let page = match self.launcher.launch().await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "Browser launch failed");
                return PublishResult::failed();
            }
        };

        let mut session = Session::new(page);
        let outcome = self.attempt(&mut session, article, credentials).await;
        session.terminate().await;

        match outcome {
            Ok(resolution) => {
                if matches!(resolution, Resolution::BestEffort { .. }) {
                    tracing::warn!(url = %resolution.url(), "Published with best-effort URL");
                }
                PublishResult::published(resolution.into_url())
            }
            Err(e) => {
                tracing::error!(title = %article.title, error = %e, "Publish failed");
                PublishResult::failed()
            }
        }
    }

    async fn attempt(
        &self,
        session: &mut Session<L::Page>,
        article: &ArticlePayload,
        credentials: &Credentials,
    ) -> Result<Resolution, AppError> {
        session.authenticate(credentials, &self.config).await?;

        let page = session.page();
        navigate(page, &self.config.cms.compose_url, &self.config.navigation_retry).await?;
        settle(self.config.timings.settle).await;

        let injector = ContentInjector::new(page, &self.config);
        injector.fill_fields(article).await?;
        let body = injector.inject_body(&article.body_markup).await?;
        injector.attach_cover(article, &self.images).await?;
        injector.submit(body).await?;

        Ok(ResultResolver::new(page, &self.config).resolve().await)
    }
}

impl<L, H, R> ArticlePublisher for Publisher<L, H, R>
where
    L: BrowserLauncher,
    H: HttpClient,
    R: FingerprintStore,
{
    async fn publish(&self, article: &ArticlePayload, credentials: &Credentials) -> PublishResult {
        Publisher::publish(self, article, credentials).await
    }
}
