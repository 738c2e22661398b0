//! `netmgr send`: submit a message for routing.

use clap::Args;
use netmgr_core::{PeerIdentity, Transport};
use netmgr_node::api::{SendMessageRequest, SendMessageResponse};
use netmgr_node::SendOutcome;

use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Message payload (UTF-8).
    #[arg(short = 'm', long)]
    pub payload: String,

    /// Destination peer id.
    #[arg(long)]
    pub to: String,

    /// Destination transport; resolved from the directory when omitted.
    #[arg(short, long)]
    pub transport: Option<Transport>,

    /// Destination address; resolved from the directory when omitted.
    #[arg(short, long)]
    pub address: Option<String>,

    /// Force an explicit next hop through this driver id.
    #[arg(long)]
    pub driver: Option<String>,

    /// Drop the message if still undelivered after this many seconds.
    #[arg(long)]
    pub ttl: Option<i64>,
}

pub async fn run(client: &ApiClient, args: &SendArgs) -> anyhow::Result<()> {
    let destination = match args.transport {
        Some(transport) => PeerIdentity::new(
            args.to.clone(),
            transport,
            args.address.clone().unwrap_or_default(),
        ),
        None => PeerIdentity::unresolved(args.to.clone()),
    };
    let body = SendMessageRequest {
        payload: args.payload.clone(),
        destination: Some(destination),
        peers: Vec::new(),
        driver: args.driver.clone(),
        ttl_secs: args.ttl,
    };

    let resp: SendMessageResponse = client.post("messages", &body).await?;
    for outcome in resp.outcomes {
        match outcome {
            SendOutcome::Accepted {
                message_id,
                transport,
                peer_id,
            } => println!("Message {message_id} handed to {transport} for {peer_id}."),
            SendOutcome::Held { message_id, reason } => {
                println!("Message {message_id} held for retry: {reason}")
            }
            SendOutcome::DeadLettered { message_id, reason } => {
                println!("Message {message_id} dead-lettered: {reason}")
            }
            SendOutcome::Failed { message_id, reason } => {
                println!("Message {message_id} failed: {reason}")
            }
        }
    }
    Ok(())
}
