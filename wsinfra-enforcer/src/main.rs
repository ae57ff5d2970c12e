//! wsinfra-enforcer: command line front end.
//!
//! - `plan` prints the corrective actions for a desired/observed pair
//! - `apply` reconciles specs against a snapshot-backed in-memory cloud
//! - `await-instances` / `await-database` wait on snapshot-backed resources
//! - `await-http` blocks until a URL answers 200

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsinfra_enforcer::convergence::{
    await_database_available, await_http_available, await_instances_running,
};
use wsinfra_enforcer::gateway::{CloudSnapshot, InMemoryCloud, ReqwestProbe, Retrying};
use wsinfra_enforcer::{diff, reconcile_all, spec_for_role, EnforcerConfig, LoadBalancerReconciler};
use wsinfra_enforcer::{ObservedState, ResourceSpec};

/// Workshop infrastructure enforcer
#[derive(Parser, Debug)]
#[command(name = "wsinfra-enforcer", version, about)]
struct Cli {
    /// JSON config file (poll parameters, retry delay, concurrency)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the action plan as JSON
    Plan {
        /// Desired load balancer spec
        #[arg(long)]
        desired: PathBuf,

        /// Observed load balancer state (absent = does not exist)
        #[arg(long)]
        observed: Option<PathBuf>,
    },

    /// Reconcile against an in-memory cloud loaded from a snapshot file
    Apply {
        /// Desired load balancer spec (repeatable)
        #[arg(long)]
        desired: Vec<PathBuf>,

        /// Application whose `Role`-tagged instances the load balancer serves (repeatable)
        #[arg(long)]
        application: Vec<String>,

        /// Health check URI for `--application` load balancers
        #[arg(long, default_value = "/")]
        health_check_uri: String,

        /// Cloud snapshot, rewritten after the run
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Wait until instances are running, terminating the ones that died
    AwaitInstances {
        /// Instance IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Cloud snapshot, rewritten after the run
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Wait until a database is available and print its JDBC URL
    AwaitDatabase {
        /// Database instance ID
        id: String,

        /// Cloud snapshot
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Wait until a URL answers HTTP 200
    AwaitHttp {
        url: String,
    },
}

fn load_cloud(path: &Path) -> Result<Arc<InMemoryCloud>> {
    Ok(Arc::new(InMemoryCloud::from_snapshot(read_json::<CloudSnapshot>(path)?)))
}

async fn save_cloud(cloud: &InMemoryCloud, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(&cloud.snapshot().await)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    info!("Snapshot saved to {}", path.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wsinfra_enforcer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EnforcerConfig::load(path)?,
        None => EnforcerConfig::default(),
    };

    match cli.command {
        Commands::Plan { desired, observed } => {
            let desired: ResourceSpec = read_json(&desired)?;
            let observed: Option<ObservedState> = match observed {
                Some(path) => Some(read_json(&path)?),
                None => None,
            };
            let actions = diff(&desired, observed.as_ref());
            println!("{}", serde_json::to_string_pretty(&actions)?);
        }

        Commands::Apply {
            desired,
            application,
            health_check_uri,
            snapshot,
        } => {
            if desired.is_empty() && application.is_empty() {
                bail!("nothing to apply: pass --desired or --application");
            }
            let mut specs = desired
                .iter()
                .map(|path| read_json::<ResourceSpec>(path))
                .collect::<Result<Vec<_>>>()?;
            let cloud = load_cloud(&snapshot)?;
            let gateway = Arc::new(Retrying::new(
                Arc::clone(&cloud),
                config.transient_retry_delay(),
            ));
            for app in &application {
                specs.push(spec_for_role(&*gateway, app, &health_check_uri).await?);
            }
            let reconciler = Arc::new(LoadBalancerReconciler::new(gateway, &config));

            let results = reconcile_all(reconciler, specs, config.max_concurrency).await;

            let mut confirmed = BTreeMap::new();
            let mut failed = 0;
            for (name, result) in results {
                match result {
                    Ok(state) => {
                        confirmed.insert(name, state);
                    }
                    Err(e) => {
                        error!("Failed to reconcile {}: {}", name, e);
                        failed += 1;
                    }
                }
            }

            save_cloud(&cloud, &snapshot).await?;

            println!("{}", serde_json::to_string_pretty(&confirmed)?);
            if failed > 0 {
                bail!("{} load balancers failed to reconcile", failed);
            }
        }

        Commands::AwaitInstances { ids, snapshot } => {
            let cloud = load_cloud(&snapshot)?;
            let gateway = Retrying::new(Arc::clone(&cloud), config.transient_retry_delay());
            let started = await_instances_running(&gateway, &ids, config.instance_running).await;
            save_cloud(&cloud, &snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&started?)?);
        }

        Commands::AwaitDatabase { id, snapshot } => {
            let cloud = load_cloud(&snapshot)?;
            let gateway = Retrying::new(cloud, config.transient_retry_delay());
            let database =
                await_database_available(&gateway, &id, config.database_available).await?;
            match database.jdbc_url() {
                Some(url) => println!("{}", url),
                None => bail!("database {} is available but has no endpoint", id),
            }
        }

        Commands::AwaitHttp { url } => {
            let probe = ReqwestProbe::new()?;
            await_http_available(&probe, &url, config.http_available).await?;
        }
    }

    Ok(())
}
