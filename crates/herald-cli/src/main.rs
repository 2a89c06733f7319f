mod file_queue;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use herald_client::{ChromiumLauncher, LaunchOptions, ReqwestHttpClient};
use herald_core::image::inspect_image;
use herald_core::traits::{FingerprintStore, HttpClient};
use herald_core::{
    ArticlePayload, BatchRunner, CmsConfig, Credentials, FingerprintRegistry, ImageConfig,
    ImagePipeline, Publisher, PublisherConfig, RunnerConfig, TracingRunnerReporter,
};

use file_queue::JsonFileQueue;

type ChromiumPublisher = Publisher<ChromiumLauncher, ReqwestHttpClient, FingerprintRegistry>;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Publish finished articles to a WellCMS site through a real browser"
)]
struct Cli {
    /// Placeholder image fingerprint registry (JSON)
    #[arg(
        long,
        global = true,
        env = "HERALD_REGISTRY",
        default_value = "image_fingerprints.json"
    )]
    registry: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a single article and print the result as JSON
    Publish {
        /// Article JSON file (title, body_markup, category_id, ...)
        #[arg(short, long)]
        article: PathBuf,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Publish pending items from a JSON work queue
    Batch {
        /// Queue file: an array of items with a status of Ready, Pending or Published
        #[arg(short, long)]
        queue: PathBuf,

        /// Maximum number of items to process
        #[arg(short, long, default_value_t = 2)]
        limit: usize,

        /// Base pause between items, in seconds
        #[arg(long, env = "HERALD_DELAY_SECS", default_value_t = 5)]
        delay_secs: u64,

        /// Maximum random jitter added to the pause, in seconds
        #[arg(long, env = "HERALD_JITTER_SECS", default_value_t = 10)]
        jitter_secs: u64,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Inspect or extend the placeholder image registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Report size, hash and registry status of an image file or URL
    Check {
        /// Local path or http(s) URL
        target: String,
    },
    /// Add a hash to the auto-learned list and persist
    Add { hash: String },
    /// Print every known hash
    List,
}

/// Target site, accounts and browser settings shared by publishing commands.
#[derive(Args)]
struct SiteArgs {
    /// Site base URL (e.g., "https://example.com/news")
    #[arg(long, env = "HERALD_BASE_URL")]
    base_url: String,

    /// Override the derived compose page URL
    #[arg(long, env = "HERALD_COMPOSE_URL")]
    compose_url: Option<String>,

    /// Accounts file: {"accounts": [{"username": .., "password": ..}]}
    #[arg(long, env = "HERALD_ACCOUNTS_FILE")]
    accounts_file: Option<PathBuf>,

    /// Accounts document inline, same format as --accounts-file
    #[arg(long, env = "HERALD_ACCOUNTS_JSON", hide_env_values = true)]
    accounts_json: Option<String>,

    #[arg(long, env = "HERALD_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "HERALD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Show the browser window
    #[arg(long, env = "HERALD_HEADED", default_value_t = false)]
    headed: bool,

    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_BIN")]
    chrome_bin: Option<PathBuf>,

    #[arg(long, env = "HERALD_USER_AGENT")]
    user_agent: Option<String>,

    /// API key for the generative image provider
    #[arg(long, env = "HERALD_GENERATIVE_API_KEY", hide_env_values = true)]
    generative_api_key: Option<String>,

    #[arg(long, env = "HERALD_PEXELS_API_KEY", hide_env_values = true)]
    pexels_api_key: Option<String>,

    #[arg(long, env = "HERALD_PIXABAY_API_KEY", hide_env_values = true)]
    pixabay_api_key: Option<String>,

    /// Never add newly detected placeholder hashes to the registry
    #[arg(long, default_value_t = false)]
    no_auto_learn: bool,
}

#[derive(Deserialize)]
struct AccountsDocument {
    accounts: Vec<Credentials>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("herald=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Publish { article, site } => {
            cmd_publish(&article, &site, &cli.registry).await?;
        }
        Commands::Batch {
            queue,
            limit,
            delay_secs,
            jitter_secs,
            site,
        } => {
            let config = RunnerConfig {
                limit,
                delay: Duration::from_secs(delay_secs),
                jitter: Duration::from_secs(jitter_secs),
            };
            cmd_batch(&queue, config, &site, &cli.registry).await?;
        }
        Commands::Registry { action } => {
            let registry = FingerprintRegistry::load(&cli.registry)
                .with_context(|| format!("Failed to load registry {}", cli.registry.display()))?;
            match action {
                RegistryAction::Check { target } => cmd_registry_check(&target, &registry).await?,
                RegistryAction::Add { hash } => cmd_registry_add(&hash, &registry)?,
                RegistryAction::List => cmd_registry_list(&registry),
            }
        }
    }

    Ok(())
}

async fn cmd_publish(article_path: &Path, site: &SiteArgs, registry_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(article_path)
        .with_context(|| format!("Failed to read article file: {}", article_path.display()))?;
    let article: ArticlePayload =
        serde_json::from_str(&raw).context("Invalid JSON in article file")?;

    let accounts = load_accounts(site)?;
    let publisher = build_publisher(site, registry_path)?;

    tracing::info!(title = %article.title, account = %accounts[0].username, "Publishing");
    let result = publisher.publish(&article, &accounts[0]).await;

    // The result object is the contract; a failed publish still exits 0.
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_batch(
    queue_path: &Path,
    config: RunnerConfig,
    site: &SiteArgs,
    registry_path: &Path,
) -> Result<()> {
    let queue = JsonFileQueue::open(queue_path)
        .with_context(|| format!("Failed to open queue {}", queue_path.display()))?;
    let accounts = load_accounts(site)?;
    let publisher = build_publisher(site, registry_path)?;
    let runner = BatchRunner::new(queue, publisher, accounts, config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current item");
            on_signal.cancel();
        }
    });

    let summary = runner
        .run(cancel, &TracingRunnerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_registry_check(target: &str, registry: &FingerprintRegistry) -> Result<()> {
    let bytes = if target.starts_with("http://") || target.starts_with("https://") {
        let http = ReqwestHttpClient::new().context("Failed to create HTTP client")?;
        http.get_bytes(target, &[])
            .await
            .map_err(|e| anyhow::anyhow!(e))?
    } else {
        std::fs::read(target).with_context(|| format!("Failed to read image: {target}"))?
    };

    let config = ImageConfig::default();
    let inspection = inspect_image(&bytes, registry, &config);
    let (low, high) = config.suspicious_band;

    println!("target:      {target}");
    println!("size:        {} bytes", inspection.size);
    println!("md5:         {}", inspection.hash);
    println!("blacklisted: {}", inspection.blacklisted);
    println!(
        "suspicious:  {} (band {low}..={high})",
        inspection.in_suspicious_band
    );
    println!(
        "undersized:  {} (minimum {})",
        inspection.below_min_size, config.min_size
    );
    Ok(())
}

fn cmd_registry_add(hash: &str, registry: &FingerprintRegistry) -> Result<()> {
    let hash = hash.trim();
    if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Expected a 32-character hex MD5 hash, got '{hash}'");
    }

    if registry.add(hash) {
        registry.persist().map_err(|e| anyhow::anyhow!(e))?;
        println!("Added {hash}");
    } else {
        println!("Already known: {hash}");
    }
    Ok(())
}

fn cmd_registry_list(registry: &FingerprintRegistry) {
    let curated = registry.blacklist();
    let learned = registry.auto_learned();

    println!("Curated blacklist ({}):", curated.len());
    for hash in &curated {
        println!("  {hash}");
    }
    println!("Auto-learned ({}):", learned.len());
    for hash in &learned {
        println!("  {hash}");
    }
    println!("\nTotal: {} hashes", registry.len());
}

fn build_publisher(site: &SiteArgs, registry_path: &Path) -> Result<ChromiumPublisher> {
    let mut cms = CmsConfig::from_base_url(&site.base_url);
    if let Some(url) = &site.compose_url {
        cms = cms.with_compose_url(url.clone());
    }
    let config = PublisherConfig::new(cms);

    let registry = FingerprintRegistry::load(registry_path)
        .with_context(|| format!("Failed to load registry {}", registry_path.display()))?;
    let images = ImageConfig {
        generative_api_key: site.generative_api_key.clone(),
        pexels_api_key: site.pexels_api_key.clone(),
        pixabay_api_key: site.pixabay_api_key.clone(),
        auto_learn: !site.no_auto_learn,
        ..ImageConfig::default()
    };
    let http = ReqwestHttpClient::new().context("Failed to create HTTP client")?;

    let launcher = ChromiumLauncher::new(LaunchOptions {
        headless: !site.headed,
        chrome_bin: site.chrome_bin.clone(),
        user_agent: site.user_agent.clone(),
        navigation_timeout: config.timings.navigation_timeout,
    });

    Ok(Publisher::new(
        launcher,
        ImagePipeline::new(http, registry, images),
        config,
    ))
}

/// Accounts from a file, then inline JSON, then a single username/password pair.
fn load_accounts(site: &SiteArgs) -> Result<Vec<Credentials>> {
    let document = if let Some(path) = &site.accounts_file {
        Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read accounts file: {}", path.display()))?,
        )
    } else {
        site.accounts_json.clone()
    };

    let accounts = match document {
        Some(raw) => parse_accounts(&raw)?,
        None => match (&site.username, &site.password) {
            (Some(user), Some(pass)) => vec![Credentials::new(user.clone(), pass.clone())],
            _ => Vec::new(),
        },
    };

    if accounts.is_empty() {
        bail!(
            "No publishing accounts configured. Use --accounts-file, HERALD_ACCOUNTS_JSON or --username/--password."
        );
    }
    tracing::debug!(accounts = accounts.len(), "Loaded publishing accounts");
    Ok(accounts)
}

fn parse_accounts(raw: &str) -> Result<Vec<Credentials>> {
    let document: AccountsDocument =
        serde_json::from_str(raw).context("Invalid accounts JSON")?;
    Ok(document
        .accounts
        .into_iter()
        .filter(|c| !c.username.trim().is_empty() && !c.password.is_empty())
        .collect())
}
