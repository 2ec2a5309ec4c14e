//! Share Negotiator - administration entry point
//!
//! Inspects local containers the way an incoming negotiation sees them and
//! manages the persisted name-mapping history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use share_negotiator::fs::checksum::MemoryChecksumCache;
use share_negotiator::manifest::{build_local_manifest, compute_diff, FileManifest};
use share_negotiator::mapping::{NameMappingStore, SqliteKeyValueStore, KEY_PREFIX};
use share_negotiator::model::Container;
use share_negotiator::negotiation::ConflictReport;
use share_negotiator::workspace::{LocalWorkspace, Workspace};
use share_negotiator::{utils, Config};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the manifest of a local container as JSON
    Manifest {
        /// Workspace-relative container name
        container: String,
    },

    /// Show what a synchronization from a remote manifest would change locally
    Diff {
        /// Workspace-relative container name
        container: String,

        /// Remote manifest (JSON)
        #[arg(short, long, value_name = "FILE")]
        remote: PathBuf,
    },

    /// Inspect or edit the remote-to-local name history
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },
}

#[derive(Subcommand, Debug)]
enum MappingAction {
    /// List peers with a recorded mapping
    List,

    /// Show the mapping recorded for a peer
    Show { peer: String },

    /// Record `source -> target` for a peer
    Set {
        peer: String,
        source: String,
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "share-negotiator v{} (agent_id: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.id
    );

    match args.command {
        Command::Manifest { container } => print_manifest(&config, &container).await,
        Command::Diff { container, remote } => print_diff(&config, &container, remote).await,
        Command::Mappings { action } => run_mappings(&config, action),
    }
}

fn open_workspace(config: &Config) -> Arc<LocalWorkspace> {
    Arc::new(
        LocalWorkspace::new(&config.workspace.root)
            .with_walk_options(config.walk_options())
            .with_auto_build(config.workspace.auto_build),
    )
}

async fn print_manifest(config: &Config, name: &str) -> Result<()> {
    let workspace = open_workspace(config);
    let path = workspace.locate(name)?;

    let manifest = tokio::task::spawn_blocking(move || {
        build_local_manifest(&*workspace, &path, &MemoryChecksumCache::new())
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

async fn print_diff(config: &Config, name: &str, remote: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&remote)
        .with_context(|| format!("Failed to read {}", remote.display()))?;
    let remote: FileManifest = serde_json::from_str(&content)?;

    let workspace = open_workspace(config);
    let container = Container {
        name: name.to_string(),
        path: workspace.locate(name)?,
    };

    let diff = tokio::task::spawn_blocking(move || {
        compute_diff(&*workspace, &container, &remote, &MemoryChecksumCache::new())
    })
    .await??;

    let report = ConflictReport::new(vec![(name.to_string(), diff)]);
    if report.is_empty() {
        println!("No local content would be removed or overwritten");
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn run_mappings(config: &Config, action: MappingAction) -> Result<()> {
    let store = Arc::new(SqliteKeyValueStore::open(&config.store.db_path)?);
    let mappings = NameMappingStore::new(store.clone());

    match action {
        MappingAction::List => {
            for key in store.keys_with_prefix(KEY_PREFIX)? {
                println!("{}", &key[KEY_PREFIX.len()..]);
            }
        }
        MappingAction::Show { peer } => {
            for (source, target) in mappings.get_mapping(&peer)? {
                println!("{} -> {}", source, target);
            }
        }
        MappingAction::Set { peer, source, target } => {
            mappings.update_mapping(&peer, &BTreeMap::from([(source.clone(), target.clone())]))?;
            tracing::info!("Recorded {} -> {} for peer {}", source, target, peer);
        }
    }

    Ok(())
}
