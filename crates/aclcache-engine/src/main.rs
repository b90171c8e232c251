use std::{env, path::Path, sync::Arc};

use aclcache_core::ProviderKind;
use aclcache_core::events::EventBroadcaster;
use aclcache_db_memory::create_storage;
use aclcache_engine::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use aclcache_engine::observability::{apply_logging_level, init_tracing, spawn_ops_log_tracer};
use aclcache_engine::{AclCache, RemoteAclDescriptor, StaticCloudDriver, UserCredential};
use aclcache_storage::{
    CatalogStorage, CloudProvider, CloudRegion, DynStorage, LoadbalancerListener,
};
use anyhow::Context;
use serde::Deserialize;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From ACLCACHE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (aclcache.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (ACLCACHE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A cloud listing for one provider and region.
#[derive(Debug, Deserialize)]
struct Fixture {
    provider: FixtureProvider,
    region: FixtureRegion,
    #[serde(default)]
    listeners: Vec<FixtureListener>,
    acls: Vec<RemoteAclDescriptor>,
}

#[derive(Debug, Deserialize)]
struct FixtureProvider {
    name: String,
    kind: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct FixtureRegion {
    name: String,
    external_id: String,
}

#[derive(Debug, Deserialize)]
struct FixtureListener {
    name: String,
    external_id: String,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    apply_logging_level(&cfg.logging.level);

    let Some(fixture_path) = resolve_fixture_path() else {
        eprintln!("usage: aclcache [--config <file>] <fixture.json>");
        std::process::exit(2);
    };

    let broadcaster = EventBroadcaster::new_shared();
    let _tracer = spawn_ops_log_tracer(&broadcaster);
    let storage = create_storage(&cfg.storage, Some(broadcaster));

    if let Err(e) = run(storage, &cfg, Path::new(&fixture_path)).await {
        eprintln!("Sync failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(
    storage: DynStorage,
    cfg: &aclcache_engine::AppConfig,
    fixture_path: &Path,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("reading fixture {}", fixture_path.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw).context("parsing fixture")?;

    let kind: ProviderKind = fixture.provider.kind.parse()?;
    let provider = storage
        .insert_provider(CloudProvider::new(
            fixture.provider.name,
            kind,
            fixture.provider.project_id,
        ))
        .await?;
    let region = storage
        .insert_region(CloudRegion::new(fixture.region.name, fixture.region.external_id))
        .await?;
    for l in fixture.listeners {
        storage
            .insert_listener(LoadbalancerListener::new(l.name, l.external_id, &provider, &region.id))
            .await?;
    }

    let driver = Arc::new(StaticCloudDriver::new());
    for acl in fixture.acls {
        driver.seed(&provider, &region, acl);
    }

    let (manager, workers) = AclCache::assemble(storage, driver, cfg).start();
    let cred = UserCredential::admin("system", &provider.project_id);
    let result = manager.sync_from_cloud(&cred, &provider, &region).await?;

    // Closing the queue lets the workers finish what was dispatched.
    drop(manager);
    workers.await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("ACLCACHE_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default to aclcache.toml
    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}

/// First positional argument.
fn resolve_fixture_path() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        return Some(arg);
    }
    None
}
