//! Cover image acquisition with placeholder detection.
//!
//! Providers are tried strictly in order until one yields bytes that pass
//! validation:
//!
//! ```text
//! generative (anonymous) -> generative (keyed) -> Pexels -> Pixabay -> Unsplash source
//! ```
//!
//! The generative provider answers an exhausted anonymous quota with HTTP 200
//! and a generic filler image. Those are recognized by content hash against a
//! [`FingerprintStore`], with a byte-size band as an advisory signal.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::config::ImageConfig;
use crate::error::AppError;
use crate::models::{ImageCandidate, image_fingerprint};
use crate::traits::{FingerprintStore, HttpClient};

const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/v1/search";
const PIXABAY_SEARCH_URL: &str = "https://pixabay.com/api/";
const UNSPLASH_SOURCE_URL: &str = "https://source.unsplash.com/1024x768/";

const FALLBACK_TERMS: [&str; 4] = ["packaging", "gift", "box", "design"];
const FALLBACK_VOCABULARY: [&str; 6] = ["packaging", "box", "paper", "gift", "luxury", "minimal"];

/// One step of the provider chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageProvider {
    GenerativeAnonymous,
    GenerativeAuthenticated,
    Pexels,
    Pixabay,
    KeywordFallback,
}

impl ImageProvider {
    /// Providers in the order they are tried.
    pub const CHAIN: [ImageProvider; 5] = [
        ImageProvider::GenerativeAnonymous,
        ImageProvider::GenerativeAuthenticated,
        ImageProvider::Pexels,
        ImageProvider::Pixabay,
        ImageProvider::KeywordFallback,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ImageProvider::GenerativeAnonymous => "generative",
            ImageProvider::GenerativeAuthenticated => "generative-keyed",
            ImageProvider::Pexels => "pexels",
            ImageProvider::Pixabay => "pixabay",
            ImageProvider::KeywordFallback => "unsplash-source",
        }
    }

    pub fn is_generative(self) -> bool {
        matches!(
            self,
            ImageProvider::GenerativeAnonymous | ImageProvider::GenerativeAuthenticated
        )
    }
}

/// Result of validating one downloaded candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Broken or near-empty body.
    TooSmall { size: usize },
    /// Exact match against the registry.
    Blacklisted { hash: String },
    /// Identified as a placeholder during this run and added to the registry.
    Learned { hash: String },
}

/// Size/hash facts about an image, independent of provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInspection {
    pub size: usize,
    pub hash: String,
    pub blacklisted: bool,
    pub in_suspicious_band: bool,
    pub below_min_size: bool,
}

/// Inspect raw bytes against a registry and the configured thresholds.
pub fn inspect_image<R: FingerprintStore>(
    bytes: &[u8],
    registry: &R,
    config: &ImageConfig,
) -> ImageInspection {
    let hash = image_fingerprint(bytes);
    let (low, high) = config.suspicious_band;
    ImageInspection {
        size: bytes.len(),
        blacklisted: registry.contains(&hash),
        in_suspicious_band: (low..=high).contains(&bytes.len()),
        below_min_size: bytes.len() < config.min_size,
        hash,
    }
}

/// Walks the provider chain for each cover image request.
///
/// Keeps per-run memory: URLs that served a placeholder are never fetched
/// again, and suspicious hashes are correlated across source prompts.
pub struct ImagePipeline<H: HttpClient, R: FingerprintStore> {
    http: H,
    registry: R,
    config: ImageConfig,
    rejected_urls: Mutex<HashSet<String>>,
    suspicious: Mutex<HashMap<String, HashSet<String>>>,
}

impl<H: HttpClient, R: FingerprintStore> ImagePipeline<H, R> {
    pub fn new(http: H, registry: R, config: ImageConfig) -> Self {
        Self {
            http,
            registry,
            config,
            rejected_urls: Mutex::new(HashSet::new()),
            suspicious: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Resolve a cover image for `source_url`, or `None` once every provider
    /// has been exhausted. Running out of providers is not an error.
    pub async fn acquire_cover_image(
        &self,
        source_url: &str,
        keywords: &str,
    ) -> Option<ImageCandidate> {
        for provider in ImageProvider::CHAIN {
            match self.try_provider(provider, source_url, keywords).await {
                Ok(Some(candidate)) => {
                    tracing::info!(
                        provider = provider.name(),
                        size = candidate.bytes.len(),
                        "Cover image acquired"
                    );
                    return Some(candidate);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Image provider failed");
                }
            }
        }
        tracing::warn!(%source_url, "No image provider produced a usable cover");
        None
    }

    async fn try_provider(
        &self,
        provider: ImageProvider,
        source_url: &str,
        keywords: &str,
    ) -> Result<Option<ImageCandidate>, AppError> {
        let Some(url) = self.resolve_image_url(provider, source_url, keywords).await? else {
            return Ok(None);
        };

        if self.was_rejected(&url) {
            tracing::debug!(provider = provider.name(), %url, "Skipping URL that served a placeholder");
            return Ok(None);
        }

        let bytes = self
            .config
            .retry
            .run(provider.name(), |_| self.http.get_bytes(&url, &[]))
            .await?;

        match self.validate(provider, source_url, &url, &bytes) {
            Verdict::Accepted => Ok(Some(ImageCandidate {
                bytes,
                source: provider.name().to_string(),
            })),
            Verdict::Blacklisted { hash } | Verdict::Learned { hash } => {
                Err(AppError::PlaceholderImage { hash })
            }
            Verdict::TooSmall { size } => {
                tracing::warn!(provider = provider.name(), size, "Image candidate too small");
                Ok(None)
            }
        }
    }

    /// The direct image URL this provider would download, if it applies.
    async fn resolve_image_url(
        &self,
        provider: ImageProvider,
        source_url: &str,
        keywords: &str,
    ) -> Result<Option<String>, AppError> {
        match provider {
            ImageProvider::GenerativeAnonymous => Ok(Some(source_url.to_string())),
            ImageProvider::GenerativeAuthenticated => Ok(self.authenticated_url(source_url)),
            ImageProvider::Pexels => {
                let Some(key) = self.config.pexels_api_key.as_deref() else {
                    tracing::debug!("Pexels key not configured");
                    return Ok(None);
                };
                let query = search_query(keywords, &self.config.default_search_query);
                let search = build_url(
                    PEXELS_SEARCH_URL,
                    &[("query", query.as_str()), ("per_page", "1"), ("size", "large")],
                )?;
                let headers = [("Authorization", key)];
                let body = self
                    .config
                    .retry
                    .run("pexels search", |_| self.http.get_json(&search, &headers))
                    .await?;
                Ok(body["photos"][0]["src"]["large"].as_str().map(String::from))
            }
            ImageProvider::Pixabay => {
                let Some(key) = self.config.pixabay_api_key.as_deref() else {
                    tracing::debug!("Pixabay key not configured");
                    return Ok(None);
                };
                let query = search_query(keywords, &self.config.default_search_query);
                let search = build_url(
                    PIXABAY_SEARCH_URL,
                    &[
                        ("key", key),
                        ("q", query.as_str()),
                        ("image_type", "photo"),
                        ("per_page", "3"),
                    ],
                )?;
                let body = self
                    .config
                    .retry
                    .run("pixabay search", |_| self.http.get_json(&search, &[]))
                    .await?;
                Ok(body["hits"][0]["largeImageURL"].as_str().map(String::from))
            }
            ImageProvider::KeywordFallback => Ok(Some(format!(
                "{UNSPLASH_SOURCE_URL}?{}",
                fallback_terms(keywords).join(",")
            ))),
        }
    }

    /// Source URL with the API key appended, when keyed access applies.
    fn authenticated_url(&self, source_url: &str) -> Option<String> {
        let key = self.config.generative_api_key.as_deref()?;
        if !source_url.contains(&self.config.generative_host) || source_url.contains("key=") {
            return None;
        }
        let separator = if source_url.contains('?') { '&' } else { '?' };
        Some(format!("{source_url}{separator}key={key}"))
    }

    /// Apply size, hash and size-band checks to a downloaded candidate.
    pub fn validate(
        &self,
        provider: ImageProvider,
        source_url: &str,
        fetched_url: &str,
        bytes: &[u8],
    ) -> Verdict {
        let inspection = inspect_image(bytes, &self.registry, &self.config);

        if inspection.below_min_size {
            return Verdict::TooSmall {
                size: inspection.size,
            };
        }

        if inspection.blacklisted {
            tracing::warn!(
                provider = provider.name(),
                hash = %&inspection.hash[..8],
                "Known placeholder image"
            );
            self.remember_rejected(fetched_url);
            return Verdict::Blacklisted {
                hash: inspection.hash,
            };
        }

        if provider.is_generative() && inspection.in_suspicious_band {
            let sources = self.note_suspicious(&inspection.hash, source_url);
            tracing::warn!(
                provider = provider.name(),
                size = inspection.size,
                hash = %inspection.hash,
                sources,
                "Image size matches placeholder profile"
            );
            if self.config.auto_learn && sources >= 2 {
                self.learn(&inspection.hash);
                self.remember_rejected(fetched_url);
                return Verdict::Learned {
                    hash: inspection.hash,
                };
            }
        }

        Verdict::Accepted
    }

    /// Returns how many distinct source prompts produced this hash.
    fn note_suspicious(&self, hash: &str, source_url: &str) -> usize {
        let mut suspicious = lock(&self.suspicious);
        let sources = suspicious.entry(hash.to_string()).or_default();
        sources.insert(source_url.to_string());
        sources.len()
    }

    fn learn(&self, hash: &str) {
        if !self.registry.add(hash) {
            return;
        }
        tracing::info!(hash = %hash, "Learned new placeholder fingerprint");
        if let Err(e) = self.registry.persist() {
            tracing::warn!(error = %e, "Failed to persist fingerprint registry");
        }
    }

    fn remember_rejected(&self, url: &str) {
        lock(&self.rejected_urls).insert(url.to_string());
    }

    fn was_rejected(&self, url: &str) -> bool {
        lock(&self.rejected_urls).contains(url)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String, AppError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| AppError::Generic(format!("invalid URL {base}: {e}")))
}

/// First comma-separated keyword, or `default` when there is none.
pub fn search_query(keywords: &str, default: &str) -> String {
    keywords
        .split([',', '，'])
        .map(str::trim)
        .find(|k| !k.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Two search terms for the keyword fallback, led by the first vocabulary
/// word mentioned in `keywords`.
pub fn fallback_terms(keywords: &str) -> Vec<&'static str> {
    let lowered = keywords.to_lowercase();
    let mut terms: Vec<&'static str> = FALLBACK_TERMS.to_vec();
    if let Some(word) = FALLBACK_VOCABULARY
        .iter()
        .copied()
        .find(|w| lowered.contains(w))
    {
        terms.retain(|t| *t != word);
        terms.insert(0, word);
    }
    terms.truncate(2);
    terms
}
