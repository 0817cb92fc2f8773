use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{validate_chain, Block};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_NODE: &str = "http://127.0.0.1:5000";

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block on the node
    Mine {
        /// Node base URL
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    /// Print the full chain
    Chain {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    /// Ask the node whether its chain is valid
    Validate {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    /// Fetch the chain and check it locally
    Verify {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    /// Check that the node is up
    Health {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
}

#[derive(Deserialize)]
struct ChainView {
    chain: Vec<Block>,
    length: u64,
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<()> {
    debug!(%url, "GET");
    let res = client.get(url).send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    println!("{body}");
    Ok(())
}

/// Outcome of re-validating a fetched chain.
fn verify_chain(view: &ChainView) -> Result<String> {
    if view.chain.is_empty() {
        bail!("node returned an empty chain");
    }
    if view.length != view.chain.len() as u64 {
        bail!(
            "node reported length {} but sent {} blocks",
            view.length,
            view.chain.len()
        );
    }
    Ok(match validate_chain(&view.chain) {
        Ok(()) => format!("chain of {} blocks is valid", view.length),
        Err(violation) => format!("chain is invalid: {violation}"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    match cli.cmd {
        Command::Mine { node } => get_text(&client, &format!("{node}/mine_block")).await?,
        Command::Chain { node } => get_text(&client, &format!("{node}/get_chain")).await?,
        Command::Validate { node } => get_text(&client, &format!("{node}/is_valid")).await?,
        Command::Health { node } => get_text(&client, &format!("{node}/health")).await?,
        Command::Verify { node } => {
            let view: ChainView = client
                .get(format!("{node}/get_chain"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .context("decoding chain")?;
            info!(length = view.length, "fetched chain");
            println!("{}", verify_chain(&view)?);
        }
    }
    Ok(())
}
