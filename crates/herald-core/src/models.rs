use std::fmt;

use regex::Regex;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static IMAGE_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="([^"]+)""#).expect("valid image src pattern"));

/// A finished content item, ready to be published.
///
/// Immutable for the duration of one publish attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArticlePayload {
    pub title: String,
    /// Rich-text body (HTML). May embed one cover image by URL.
    #[serde(alias = "html_content", alias = "bodyMarkup")]
    pub body_markup: String,
    /// Category name or id; unknown values fall back to the configured default.
    #[serde(default, alias = "categoryId")]
    pub category_id: String,
    #[serde(default)]
    pub summary: String,
    /// Comma-separated keywords, also used as image search terms.
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
}

impl ArticlePayload {
    /// URL of the first image referenced by the body, with `&amp;` unescaped.
    pub fn cover_image_url(&self) -> Option<String> {
        IMAGE_SRC
            .captures(&self.body_markup)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace("&amp;", "&"))
            .filter(|u| !u.is_empty())
    }
}

/// One publishing account.
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome handed back to the work queue.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublishResult {
    pub success: bool,
    /// Canonical URL when resolved, best-effort URL otherwise, empty on failure.
    pub url: String,
}

impl PublishResult {
    pub fn published(url: impl Into<String>) -> Self {
        Self {
            success: true,
            url: url.into(),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            url: String::new(),
        }
    }
}

/// A downloaded and validated cover image. Discarded after upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub bytes: Vec<u8>,
    pub source: String,
}

impl fmt::Debug for ImageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCandidate")
            .field("bytes", &self.bytes.len())
            .field("source", &self.source)
            .finish()
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of downloaded image bytes: MD5, 32-char lowercase hex.
///
/// Matches the digests stored in existing placeholder blacklists.
pub fn image_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}
