//! The netmgr node orchestrator.
//!
//! Opens storage, builds the [`NetworkManager`], serves the HTTP API and runs
//! the retry and discovery schedules. The main event loop applies API
//! commands and reacts to network state changes. Routed messages wait in the
//! [`DriverOutbox`] until their driver takes them over the API.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use netmgr_core::NetworkState;

use crate::commands::NodeCommand;
use crate::config::NetmgrConfig;
use crate::dispatch::DriverOutbox;
use crate::retry::RocksHoldStore;
use crate::scheduler::spawn_periodic;
use crate::service::NetworkManager;
use crate::state::NodeState;
use crate::storage::Storage;

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// A running netmgr node.
pub struct NetmgrNode {
    config: NetmgrConfig,
    storage: Option<Arc<Storage>>,
    manager: Option<Arc<NetworkManager>>,
    /// Shared state accessible from HTTP handlers.
    node_state: Option<Arc<NodeState>>,
    /// Receives commands from the HTTP API.
    command_rx: Option<mpsc::Receiver<NodeCommand>>,
    /// Network state changes from the registry.
    state_rx: Option<broadcast::Receiver<NetworkState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    api_addr: Option<SocketAddr>,
}

impl NetmgrNode {
    pub fn new(config: NetmgrConfig) -> Result<Self> {
        tracing::info!(data_dir = %config.storage.data_dir.display(), "netmgr node created");
        Ok(Self {
            config,
            storage: None,
            manager: None,
            node_state: None,
            command_rx: None,
            state_rx: None,
            shutdown_tx: None,
            tasks: Vec::new(),
            api_addr: None,
        })
    }

    /// Initialize and start the node: storage, manager, HTTP API and schedules.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting netmgr node");

        let storage = Arc::new(Storage::open(&self.config.storage.data_dir)?);
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        let outbox = Arc::new(DriverOutbox::new(OUTBOUND_QUEUE_CAPACITY));
        let manager = NetworkManager::new(
            &self.config,
            Arc::new(RocksHoldStore::new(Arc::clone(&storage))),
            outbox.clone(),
        )
        .with_peer_store(Arc::clone(&storage));
        let manager = Arc::new(manager);

        for seed in &self.config.seeds {
            if let Err(e) = manager.add_seed(seed.to_identity()) {
                tracing::warn!(seed = %seed.id, error = %e, "ignoring configured seed");
            }
        }
        manager.restore_peers()?;

        let (command_tx, command_rx) = mpsc::channel::<NodeCommand>(COMMAND_CHANNEL_CAPACITY);
        let node_state = Arc::new(NodeState::new(Arc::clone(&manager), outbox, command_tx));

        // Bind before spawning so a port of 0 resolves to a known address.
        let listener = TcpListener::bind(self.config.api_addr()).await?;
        let api_addr = listener.local_addr()?;
        let api_state = Arc::clone(&node_state);
        tokio::spawn(async move {
            if let Err(e) = crate::api::start_api_server(listener, api_state).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let retry_manager = Arc::clone(&manager);
        self.tasks.push(spawn_periodic(
            "retry-sweep",
            self.config.retry.initial_delay(),
            self.config.retry.interval(),
            shutdown_rx.clone(),
            move || {
                let manager = Arc::clone(&retry_manager);
                async move {
                    if let Err(e) = manager.sweep_held() {
                        tracing::warn!(error = %e, "retry sweep failed");
                    }
                }
            },
        ));
        let discovery_manager = Arc::clone(&manager);
        self.tasks.push(spawn_periodic(
            "discovery",
            self.config.discovery.initial_delay(),
            self.config.discovery.interval(),
            shutdown_rx,
            move || {
                let manager = Arc::clone(&discovery_manager);
                async move {
                    manager.discover();
                }
            },
        ));

        self.state_rx = Some(manager.subscribe());
        self.storage = Some(storage);
        self.manager = Some(manager);
        self.node_state = Some(node_state);
        self.command_rx = Some(command_rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.api_addr = Some(api_addr);

        Ok(())
    }

    /// Run the node's main event loop: API commands and network state changes.
    pub async fn run(&mut self) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let mut state_rx = self
            .state_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let manager = self
            .manager
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;

        tracing::info!("entering main event loop");

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(c) => Self::handle_api_command(&manager, c),
                        None => {
                            tracing::info!("API command channel closed");
                            break;
                        }
                    }
                }
                change = state_rx.recv() => {
                    match change {
                        Ok(state) => Self::handle_state_change(&manager, &state),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "network state receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("network state channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down netmgr node");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.node_state = None;
        self.manager = None;
        if let Some(storage) = self.storage.take() {
            drop(storage);
            tracing::info!("storage closed");
        }

        tracing::info!("netmgr node shut down");
        Ok(())
    }

    /// The network manager, once started.
    pub fn manager(&self) -> Option<&Arc<NetworkManager>> {
        self.manager.as_ref()
    }

    /// Bound address of the HTTP API, once started.
    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api_addr
    }

    fn handle_api_command(manager: &NetworkManager, cmd: NodeCommand) {
        match cmd {
            NodeCommand::UpdateNetworkState { state, reply } => {
                let _ = reply.send(manager.update_network_state(state));
            }
            NodeCommand::SendMessage {
                envelope,
                destination,
                reply,
            } => {
                let _ = reply.send(manager.send(envelope, destination).map_err(|e| e.to_string()));
            }
            NodeCommand::PublishMessage {
                envelope,
                peers,
                reply,
            } => {
                let _ = reply.send(Ok(manager.publish(envelope, peers)));
            }
            NodeCommand::UpsertPeers { peers, reply } => {
                let _ = reply.send(manager.update_peers(peers));
            }
            NodeCommand::AddSeed { peer, reply } => {
                let _ = reply.send(manager.add_seed(peer).map_err(|e| e.to_string()));
            }
            NodeCommand::SetLocalPeer {
                transport,
                peer,
                reply,
            } => {
                manager.update_local_peer(transport, peer);
                tracing::info!(%transport, "local identity updated");
                let _ = reply.send(());
            }
            NodeCommand::InboundDiscoveryRequest { request, reply } => {
                let _ = reply.send(
                    manager
                        .handle_discovery_request(&request)
                        .map_err(|e| e.to_string()),
                );
            }
            NodeCommand::InboundDiscoveryReply { response, reply } => {
                let _ = reply.send(
                    manager
                        .handle_discovery_reply(&response)
                        .map_err(|e| e.to_string()),
                );
            }
        }
    }

    /// A transport coming up triggers an immediate retry sweep.
    fn handle_state_change(manager: &NetworkManager, state: &NetworkState) {
        if !state.status.is_connected() {
            return;
        }
        match manager.sweep_held() {
            Ok(report) if report.examined > 0 => {
                tracing::info!(transport = %state.transport, delivered = report.delivered, remaining = report.remaining, "swept held messages after reconnect");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(transport = %state.transport, error = %e, "retry sweep failed"),
        }
    }
}
