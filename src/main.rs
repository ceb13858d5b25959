use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leaderkv::{
    AppState, CounterVersionSource, FollowerApply, HttpReplicationClient, LeaderWriter, NodeRole,
    RuntimeConfig, StartupConfig, StartupOverrides, Store, TimestampVersionSource, VersionSource,
    VersioningPolicy, build_router,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "leaderkv")]
#[command(about = "Single-leader, semi-synchronous replicated key-value store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start this node
    Serve {
        /// Address to bind the HTTP server to, overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
        /// Node role: Leader or Follower, overrides NODE_ROLE
        #[arg(long)]
        role: Option<String>,
        /// Semicolon-separated follower base URLs, overrides FOLLOWERS
        #[arg(long)]
        followers: Option<String>,
        /// Minimum acks (besides the leader) required before a write succeeds, overrides WRITE_QUORUM
        #[arg(long)]
        write_quorum: Option<usize>,
        /// Minimum injected replication delay in milliseconds, overrides MIN_DELAY_MS
        #[arg(long)]
        min_delay_ms: Option<u64>,
        /// Maximum injected replication delay in milliseconds, overrides MAX_DELAY_MS
        #[arg(long)]
        max_delay_ms: Option<u64>,
        /// Per-follower send timeout in milliseconds, overrides FOLLOWER_TIMEOUT_MS
        #[arg(long)]
        follower_timeout_ms: Option<u64>,
        /// Use strictly monotonic versioning instead of last-write-wins, overrides USE_VERSIONING
        #[arg(long)]
        use_versioning: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let Commands::Serve {
        bind,
        role,
        followers,
        write_quorum,
        min_delay_ms,
        max_delay_ms,
        follower_timeout_ms,
        use_versioning,
    } = Cli::parse().command;

    let config = build_startup_config(
        bind,
        role,
        followers,
        write_quorum,
        min_delay_ms,
        max_delay_ms,
        follower_timeout_ms,
        use_versioning,
    )
    .context("failed to load node configuration")?;

    info!(role = %config.role, bind_addr = %config.bind_addr, followers = config.followers.len(), "starting node");

    let policy = if config.use_versioning {
        VersioningPolicy::Monotonic
    } else {
        VersioningPolicy::LastWriteWinsByArrival
    };
    let store = Arc::new(Store::new(policy));
    let runtime_config = Arc::new(RuntimeConfig::new(&config));

    let (leader_writer, follower_apply) = match config.role {
        NodeRole::Leader => {
            let version_source: Arc<dyn VersionSource> = if config.use_versioning {
                Arc::new(CounterVersionSource::new())
            } else {
                Arc::new(TimestampVersionSource::new())
            };
            let writer = Arc::new(LeaderWriter::new(
                Arc::clone(&store),
                version_source,
                Arc::new(HttpReplicationClient::new()),
                config.followers.clone(),
                Arc::clone(&runtime_config),
                config.follower_timeout_ms,
            ));
            (Some(writer), None)
        }
        NodeRole::Follower => (None, Some(Arc::new(FollowerApply::new(Arc::clone(&store))))),
    };

    let state = AppState {
        store,
        role: config.role,
        runtime_config,
        leader_writer,
        follower_apply,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(address = %config.bind_addr, "node listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_startup_config(
    bind: Option<String>,
    role: Option<String>,
    followers: Option<String>,
    write_quorum: Option<usize>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    follower_timeout_ms: Option<u64>,
    use_versioning: Option<bool>,
) -> leaderkv::Result<StartupConfig> {
    let role = role.map(|raw| raw.parse::<NodeRole>()).transpose()?;
    let overrides = StartupOverrides {
        role,
        bind_addr: bind,
        followers,
        write_quorum,
        follower_timeout_ms,
        min_delay_ms,
        max_delay_ms,
        use_versioning,
    };
    StartupConfig::load(overrides)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leaderkv=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
