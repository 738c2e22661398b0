//! `netmgr networks`, `netmgr network` and `netmgr report`.

use clap::Args;
use netmgr_core::{NetworkState, NetworkStatus, Transport};
use netmgr_node::api::{NetworkStateRequest, NetworkStateResponse, NetworkStatusResponse};

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct NetworksArgs {
    /// Only list connected transports.
    #[arg(long)]
    pub active: bool,
}

#[derive(Args, Debug)]
pub struct NetworkArgs {
    /// Transport name (e.g. tor, i2p, bluetooth).
    pub transport: Transport,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    pub transport: Transport,
    /// New status (e.g. connected, disconnected, port-conflict).
    pub status: NetworkStatus,
}

pub async fn list(client: &ApiClient, args: &NetworksArgs) -> anyhow::Result<()> {
    if args.active {
        let active: Vec<Transport> = client.get("networks/active").await?;
        if active.is_empty() {
            println!("No transport is connected.");
        }
        for transport in active {
            println!("  {transport}");
        }
        return Ok(());
    }

    let states: Vec<NetworkState> = client.get("networks").await?;
    if states.is_empty() {
        println!("No transport has reported yet.");
    }
    for state in states {
        println!(
            "  {:<10} {:<14} since {}",
            state.transport.to_string(),
            state.status.to_string(),
            state.reported_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn show(client: &ApiClient, args: &NetworkArgs) -> anyhow::Result<()> {
    let resp: NetworkStatusResponse = client
        .get(&format!("networks/{}", args.transport.name()))
        .await?;
    println!("{}: {} ({})", resp.transport, resp.status, resp.description);
    Ok(())
}

pub async fn report(client: &ApiClient, args: &ReportArgs) -> anyhow::Result<()> {
    let body = NetworkStateRequest {
        transport: args.transport,
        status: args.status,
    };
    let resp: NetworkStateResponse = client.post("networks/state", &body).await?;
    match resp.previous {
        Some(previous) => println!("{}: {} -> {}", resp.transport, previous, resp.status),
        None => println!("{}: {}", resp.transport, resp.status),
    }
    Ok(())
}
