//! netmgr CLI: command-line interface for a running netmgr node.
//!
//! Subcommands: init, status, networks, network, report, peers, capability,
//! add-peer, seed, path, send.

mod client;
mod commands;

use clap::{Parser, Subcommand};

/// netmgr: route messages across whichever transports are up.
#[derive(Parser, Debug)]
#[command(name = "netmgr", version, about, long_about = None)]
struct Cli {
    /// API endpoint of the node.
    #[arg(short, long, global = true, default_value = "http://127.0.0.1:9301")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default node configuration.
    Init(commands::init::InitArgs),
    /// Query the status of a running node.
    Status,
    /// List transports and their reported state.
    Networks(commands::networks::NetworksArgs),
    /// Show the state of one transport.
    Network(commands::networks::NetworkArgs),
    /// Report a transport state change on behalf of a driver.
    Report(commands::networks::ReportArgs),
    /// Show peer counts per transport.
    Peers,
    /// List peers advertising a capability.
    Capability(commands::peers::CapabilityArgs),
    /// Add or refresh a discovered peer.
    AddPeer(commands::peers::PeerArgs),
    /// Register a bootstrap peer.
    Seed(commands::peers::PeerArgs),
    /// Show the lowest-cost relay path to a peer.
    Path(commands::peers::PathArgs),
    /// Send a message.
    Send(commands::send::SendArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = client::ApiClient::new(&cli.endpoint);

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Status => commands::status::run(&client).await,
        Commands::Networks(args) => commands::networks::list(&client, args).await,
        Commands::Network(args) => commands::networks::show(&client, args).await,
        Commands::Report(args) => commands::networks::report(&client, args).await,
        Commands::Peers => commands::peers::counts(&client).await,
        Commands::Capability(args) => commands::peers::capability(&client, args).await,
        Commands::AddPeer(args) => commands::peers::add(&client, args).await,
        Commands::Seed(args) => commands::peers::seed(&client, args).await,
        Commands::Path(args) => commands::peers::path(&client, args).await,
        Commands::Send(args) => commands::send::run(&client, args).await,
    }
}
