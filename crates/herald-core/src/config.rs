//! Typed configuration for a publishing target.
//!
//! Defaults describe a WellCMS-style admin UI. The binary fills these from
//! flags and `HERALD_*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// URLs and location markers of the target CMS.
#[derive(Debug, Clone)]
pub struct CmsConfig {
    /// Public-site login page.
    pub login_url: String,
    /// Admin entry point.
    pub admin_url: String,
    /// Compose page for a new content item.
    pub compose_url: String,
    /// Admin content listing, newest first.
    pub listing_url: String,
    /// Canonical public URL with an `{id}` placeholder.
    pub canonical_url_template: String,
    pub markers: LocationMarkers,
}

impl CmsConfig {
    /// Derive the standard URL set from the site base (e.g. `https://example.com/news`).
    pub fn from_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let admin_url = format!("{base}/admin/index.php");
        Self {
            login_url: format!("{base}/user-login.html"),
            compose_url: format!("{admin_url}?0=content&1=create&fid=2"),
            listing_url: format!("{admin_url}?0=content&1=list"),
            canonical_url_template: format!("{base}/read-{{id}}.html"),
            admin_url,
            markers: LocationMarkers::default(),
        }
    }

    pub fn with_compose_url(mut self, url: impl Into<String>) -> Self {
        self.compose_url = url.into();
        self
    }

    pub fn with_canonical_url_template(mut self, template: impl Into<String>) -> Self {
        self.canonical_url_template = template.into();
        self
    }

    /// Render the canonical URL for a content identifier.
    pub fn canonical_url(&self, id: &str) -> String {
        self.canonical_url_template.replace("{id}", id)
    }
}

/// Substrings used to classify the browser's location.
#[derive(Debug, Clone)]
pub struct LocationMarkers {
    /// Present in every admin-area URL.
    pub admin: String,
    /// Present in any login URL (public or admin).
    pub login: String,
    /// Present in the public login page URL; landing here means rejection.
    pub frontend_login: String,
    /// Internal search utility that superficially looks like admin.
    pub search: String,
}

impl Default for LocationMarkers {
    fn default() -> Self {
        Self {
            admin: "admin".to_string(),
            login: "login".to_string(),
            frontend_login: "user-login".to_string(),
            search: "operate-search".to_string(),
        }
    }
}

/// CSS selectors for the login and compose forms.
#[derive(Debug, Clone)]
pub struct FormSelectors {
    pub login_email: String,
    pub login_password: String,
    pub login_submit: String,
    pub admin_password: String,
    pub admin_submit: String,
    pub title: String,
    pub category: String,
    pub summary: String,
    pub keywords: String,
    pub description: String,
    pub tags: String,
    pub disable_comments: String,
    pub body_field: String,
    pub cover_input: String,
    pub submit: String,
    /// Id the rich-text editor is registered under.
    pub editor_id: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            login_email: "#email".to_string(),
            login_password: "#password".to_string(),
            // The public page also has a search button with id="submit".
            login_submit: "button.btn-primary#submit".to_string(),
            admin_password: "input#password".to_string(),
            admin_submit: "button.btn-danger#submit".to_string(),
            title: "#subject".to_string(),
            category: "select[name=\"fid\"]".to_string(),
            summary: "#brief".to_string(),
            keywords: "#keyword".to_string(),
            description: "#description".to_string(),
            tags: "#tags".to_string(),
            disable_comments: "#closed-box".to_string(),
            body_field: "textarea[name=\"message\"]".to_string(),
            cover_input: "input[data-assoc=\"img_1\"]".to_string(),
            submit: "#submit".to_string(),
            editor_id: "message".to_string(),
        }
    }
}

/// Maps category names (or raw ids) to the CMS category id.
#[derive(Debug, Clone)]
pub struct CategoryMap {
    by_name: HashMap<String, String>,
    default_id: String,
}

impl CategoryMap {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            by_name: HashMap::new(),
            default_id: default_id.into(),
        }
    }

    pub fn with_category(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.by_name.insert(name.into(), id.into());
        self
    }

    /// Resolve a name or id, falling back to the default for anything unknown.
    pub fn resolve(&self, value: &str) -> &str {
        let value = value.trim();
        if let Some(id) = self.by_name.get(value) {
            return id;
        }
        self.by_name
            .values()
            .find(|id| id.as_str() == value)
            .map(String::as_str)
            .unwrap_or(self.default_id.as_str())
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        Self::new("0")
            .with_category("专业知识", "1")
            .with_category("行业资讯", "2")
            .with_category("产品介绍", "3")
    }
}

/// Bounded waits used throughout a publish attempt.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Pause after navigations and form actions to let the UI settle.
    pub settle: Duration,
    /// How long to look for an optional form (login, re-confirmation).
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Navigation wait after clicking the compose form's submit button.
    pub submit_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            selector_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(20),
            submit_timeout: Duration::from_secs(60),
        }
    }
}

impl Timings {
    /// No settling pauses and short waits; for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            selector_timeout: Duration::from_millis(10),
            navigation_timeout: Duration::from_millis(10),
            submit_timeout: Duration::from_millis(10),
        }
    }
}

/// Thresholds and keys for the cover image pipeline.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Host marker of the generative provider.
    pub generative_host: String,
    pub generative_api_key: Option<String>,
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    /// Candidates smaller than this are broken or placeholders.
    pub min_size: usize,
    /// Inclusive byte-size band associated with known placeholders (advisory).
    pub suspicious_band: (usize, usize),
    /// Learn placeholder hashes that are confidently identified at runtime.
    pub auto_learn: bool,
    pub default_search_query: String,
    pub retry: RetryPolicy,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            generative_host: "pollinations.ai".to_string(),
            generative_api_key: None,
            pexels_api_key: None,
            pixabay_api_key: None,
            min_size: 10 * 1024,
            suspicious_band: (45_000, 55_000),
            auto_learn: true,
            default_search_query: "packaging box".to_string(),
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }
}

/// Listing scan behaviour for recovering the canonical URL.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Full listing scans before falling back to the current URL.
    pub attempts: u32,
    /// Pause between full scans.
    pub retry_delay: Duration,
    /// Row polls within one scan.
    pub polls: u32,
    pub poll_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(2),
            polls: 3,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Everything one publisher needs to know about its target.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub cms: CmsConfig,
    pub selectors: FormSelectors,
    pub categories: CategoryMap,
    pub timings: Timings,
    pub resolver: ResolverConfig,
    /// Backoff for page navigations.
    pub navigation_retry: RetryPolicy,
    /// Full editor passes when every strategy failed transiently.
    pub injection_retry: RetryPolicy,
    /// Where cover temp files are created; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Round-tripped editor content shorter than this fraction of the input is truncated.
    pub min_roundtrip_ratio: f64,
    pub disable_comments: bool,
}

impl PublisherConfig {
    pub fn new(cms: CmsConfig) -> Self {
        Self {
            cms,
            selectors: FormSelectors::default(),
            categories: CategoryMap::default(),
            timings: Timings::default(),
            resolver: ResolverConfig::default(),
            navigation_retry: RetryPolicy::new(4, Duration::from_secs(3)),
            injection_retry: RetryPolicy::new(3, Duration::from_secs(1)),
            scratch_dir: None,
            min_roundtrip_ratio: 0.5,
            disable_comments: true,
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_navigation_retry(mut self, policy: RetryPolicy) -> Self {
        self.navigation_retry = policy;
        self
    }

    pub fn with_injection_retry(mut self, policy: RetryPolicy) -> Self {
        self.injection_retry = policy;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_categories(mut self, categories: CategoryMap) -> Self {
        self.categories = categories;
        self
    }
}
