// crates/wot-daemon/src/main.rs
//
// Binary entrypoint for the web-of-trust daemon.
//
// Parses CLI arguments, loads configuration, initializes tracing, opens the
// persistent trust graph, runs the startup integrity check and then either
// serves background recomputation until interrupted or runs a one-shot
// command (check, import, create-identity).

mod config;
mod import;
mod state;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::DaemonConfig;
use state::{NodeState, NodeStateMachine};

use wot_core::crypto::Keypair;
use wot_reputation::WebOfTrust;
use wot_store::GraphStore;

/// Web-of-trust daemon: maintains per-identity trust trees and scores.
#[derive(Parser, Debug)]
#[command(name = "wot-daemon", version = "0.1.0", about = "Web-of-trust score engine daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.wot/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute trees in the background until interrupted (default).
    Run,
    /// Verify the stored graph, bring every tree up to date and exit.
    Check,
    /// Apply published trust lists from a JSON file.
    Import {
        /// Path to the JSON file.
        path: String,
    },
    /// Generate a new own identity and print its id.
    CreateIdentity {
        #[arg(long)]
        nickname: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration is loaded before tracing so that its log level applies.
    let loaded = DaemonConfig::load(&args.config);
    let log_level = match &loaded {
        Ok(cfg) => cfg.log_level.clone(),
        Err(_) => DaemonConfig::default().log_level,
    };

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    let daemon_config = match loaded {
        Ok(cfg) => {
            tracing::info!("Loaded configuration from {}", args.config);
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "Could not load config from {}: {}. Using defaults.",
                args.config,
                e
            );
            DaemonConfig::default()
        }
    };

    let mut state_machine = NodeStateMachine::new();
    tracing::info!("Web-of-trust daemon starting in state: {}", state_machine.current);

    let capacities = daemon_config.capacity.clone();
    tracing::info!(
        "Capacity table: {:?}, max rank {}",
        capacities.entries(),
        capacities.max_rank()
    );

    let data_dir = expand_tilde(&daemon_config.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = format!("{}/rocksdb", data_dir);

    let store = match GraphStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("FATAL: could not load trust graph from {}: {}", db_path, e);
            return Err(e.into());
        }
    };
    let wot = WebOfTrust::new(store, capacities, daemon_config.scheduler_config());

    state_machine.transition(NodeState::Checking)?;
    if let Err(e) = wot.init() {
        tracing::error!("FATAL: integrity check failed ({}): {}", e.kind(), e);
        state_machine.transition(NodeState::ShuttingDown)?;
        wot.terminate();
        return Err(e.into());
    }
    state_machine.transition(NodeState::Ready)?;

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&wot).await,
        Command::Check => wot.run_pending().map(|passes| {
            tracing::info!("Recomputed {} trust trees", passes.len());
        }),
        Command::Import { path } => {
            let lists = import::load_trust_lists(&path)?;
            tracing::info!("Importing {} trust lists from {}", lists.len(), path);
            import::import_trust_lists(&wot, &lists).and_then(|_| wot.run_pending().map(|_| ()))
        }
        Command::CreateIdentity { nickname } => {
            let keypair = Keypair::generate();
            wot.create_own_identity(&keypair, nickname.as_deref())
                .and_then(|id| {
                    wot.run_pending()?;
                    println!("{}", id);
                    Ok(())
                })
        }
    };

    state_machine.transition(NodeState::ShuttingDown)?;
    wot.terminate();
    tracing::info!("Web-of-trust daemon stopped");
    result.map_err(Into::into)
}

/// Serve background recomputation until ctrl-c, then drain what is left.
async fn run(wot: &WebOfTrust) -> Result<(), wot_core::error::WotError> {
    let worker = wot.spawn_worker();
    tracing::info!("Recomputation worker running. Press ctrl-c to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
    }
    tracing::info!("Shutdown signal received");

    wot.scheduler().shutdown();
    if let Err(e) = worker.await {
        tracing::warn!("Recomputation worker ended abnormally: {}", e);
    }

    let passes = wot.run_pending()?;
    if !passes.is_empty() {
        tracing::info!("Drained {} recompute passes before shutdown", passes.len());
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/wot"), "/var/lib/wot");
        assert_eq!(expand_tilde("relative/dir"), "relative/dir");
    }

    #[test]
    fn test_subcommand_defaults_to_run() {
        let args = Args::parse_from(["wot-daemon"]);
        assert!(args.command.is_none());
        assert_eq!(args.config, "~/.wot/config.toml");

        let args = Args::parse_from(["wot-daemon", "import", "lists.json"]);
        assert!(matches!(args.command, Some(Command::Import { ref path }) if path == "lists.json"));
    }
}
