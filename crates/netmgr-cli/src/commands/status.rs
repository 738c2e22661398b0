//! `netmgr status`: query a running node.

use netmgr_node::api::StatusResponse;

use crate::client::ApiClient;

pub async fn run(client: &ApiClient) -> anyhow::Result<()> {
    let status: StatusResponse = client.get("status").await?;

    let active: Vec<String> = status.active_networks.iter().map(|t| t.to_string()).collect();
    println!("Node Status:");
    println!("  Version:     {}", status.version);
    println!("  Uptime:      {}s", status.uptime_secs);
    println!(
        "  Networks:    {}",
        if active.is_empty() { "(none connected)".to_string() } else { active.join(", ") }
    );
    println!("  Peers:       {}", status.peer_count);
    println!("  Held:        {}", status.held_messages);
    println!("  Handed off:  {}", status.handed_off);

    Ok(())
}
