mod api;
mod constants;

use api::AppState;
use clap::Parser;
use constants::{DEFAULT_LISTEN, DEFAULT_MINE_TIMEOUT_SECS};
use ledger_core::{CancelToken, Ledger, SearchMode};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 0.0.0.0:5000
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Give up on a mining request after this many seconds
    #[arg(long, default_value_t = DEFAULT_MINE_TIMEOUT_SECS)]
    mine_timeout_secs: u64,

    /// Spread the proof search across all cores
    #[arg(long)]
    parallel: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args.listen.parse()?;
    let search = if args.parallel {
        SearchMode::Parallel
    } else {
        SearchMode::Sequential
    };

    let shutdown = CancelToken::new();
    let state = AppState {
        ledger: Arc::new(Ledger::new()),
        search,
        mine_timeout: Duration::from_secs(args.mine_timeout_secs),
        shutdown: shutdown.clone(),
    };
    let app = api::router(state);

    info!(?search, "ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancelToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested, cancelling in-flight mining");
    shutdown.cancel();
}
