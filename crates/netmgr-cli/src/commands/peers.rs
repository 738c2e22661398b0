//! Peer directory commands.

use std::collections::BTreeMap;

use clap::Args;
use netmgr_core::{PeerIdentity, Transport};
use netmgr_node::PeerUpdateReport;
use netmgr_routing::PeerPath;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct PeerArgs {
    #[arg(long)]
    pub id: String,
    #[arg(short, long)]
    pub transport: Transport,
    #[arg(short, long, default_value = "")]
    pub address: String,
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Advertised capability; repeatable.
    #[arg(long = "service")]
    pub services: Vec<String>,
}

impl PeerArgs {
    fn to_identity(&self) -> PeerIdentity {
        let mut peer = PeerIdentity::new(self.id.clone(), self.transport, self.address.clone());
        if let Some(port) = self.port {
            peer = peer.with_port(port);
        }
        for service in &self.services {
            peer = peer.with_service(service.clone());
        }
        peer
    }
}

#[derive(Args, Debug)]
pub struct CapabilityArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    pub peer_id: String,
}

pub async fn counts(client: &ApiClient) -> anyhow::Result<()> {
    let counts: BTreeMap<Transport, usize> = client.get("peers/count").await?;
    if counts.is_empty() {
        println!("No peers known.");
    }
    for (transport, count) in counts {
        println!("  {:<10} {}", transport.to_string(), count);
    }
    Ok(())
}

pub async fn capability(client: &ApiClient, args: &CapabilityArgs) -> anyhow::Result<()> {
    let peers: Vec<PeerIdentity> = client
        .get(&format!("peers/capability/{}", args.name))
        .await?;
    println!("Peers offering '{}': {}", args.name, peers.len());
    for peer in peers {
        println!("  {}  {}", peer, peer.address);
    }
    Ok(())
}

pub async fn add(client: &ApiClient, args: &PeerArgs) -> anyhow::Result<()> {
    let report: PeerUpdateReport = client.post("peers", &vec![args.to_identity()]).await?;
    if let Some(reason) = report.rejected.first() {
        anyhow::bail!("peer rejected: {}", reason);
    }
    println!("Peer {} stored.", args.id);
    Ok(())
}

pub async fn seed(client: &ApiClient, args: &PeerArgs) -> anyhow::Result<()> {
    client.post_empty("peers/seed", &args.to_identity()).await?;
    println!("Seed {} registered for {}.", args.id, args.transport);
    Ok(())
}

pub async fn path(client: &ApiClient, args: &PathArgs) -> anyhow::Result<()> {
    let path: PeerPath = client.get(&format!("paths/{}", args.peer_id)).await?;
    println!("{} (cost {:.1} ms, {} hops)", path.peers.join(" -> "), path.cost, path.hops());
    Ok(())
}
