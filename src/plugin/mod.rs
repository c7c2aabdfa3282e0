//! Per-bridge device plugin
//!
//! One instance per configured bridge: it advertises a fixed pool of bridge
//! ports, answers Allocate with an assignment path per port, and runs an
//! attach worker that wires each port into its container once it shows up.

pub mod allocator;
pub mod assignment;
pub mod devices;
pub mod sentinel;

use crate::grpc::device_plugin::DevicePluginService;
use crate::grpc::server;
use crate::network::namespace::KernelNetns;
use crate::network::netlink::NetlinkHandle;
use crate::network::veth::AttachmentEngine;
use crate::network::{LinkOps, NetnsOps, NetworkError};
use crate::runtime::ContainerResolver;
use crate::utils::constants::{
    ASSIGNMENT_QUEUE_CAPACITY, ASSIGNMENT_SCAN_INTERVAL, ASSIGNMENT_TIMEOUT, BRIDGE_POLL_INTERVAL,
    DEVICE_PLUGIN_DIR, FAKE_DEVICE_PATH, NICS_POOL_SIZE, RESOURCE_NAMESPACE,
};
use crate::utils::random::SharedRandom;
use allocator::Allocator;
use assignment::AttachWorker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC error: {0}")]
    Status(#[from] tonic::Status),

    #[error("Sentinel device error: {0}")]
    Sentinel(String),

    /// The attach worker is gone; the assignment for this device was not
    /// recorded
    #[error("Assignment queue closed, dropped assignment for {0}")]
    QueueClosed(String),

    #[error("Attach worker for bridge {0} stopped")]
    WorkerStopped(String),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Settings for one bridge's plugin instance
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub bridge: String,
    pub pool_size: usize,
    pub poll_interval: Duration,
    pub scan_interval: Duration,
    pub assignment_timeout: Duration,
    pub queue_capacity: usize,
    pub sentinel_path: PathBuf,
    pub plugin_dir: PathBuf,
}

impl PluginConfig {
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            pool_size: NICS_POOL_SIZE,
            poll_interval: BRIDGE_POLL_INTERVAL,
            scan_interval: ASSIGNMENT_SCAN_INTERVAL,
            assignment_timeout: ASSIGNMENT_TIMEOUT,
            queue_capacity: ASSIGNMENT_QUEUE_CAPACITY,
            sentinel_path: PathBuf::from(FAKE_DEVICE_PATH),
            plugin_dir: PathBuf::from(DEVICE_PLUGIN_DIR),
        }
    }

    /// Extended resource name pods request, e.g.
    /// `bridge.network.kubevirt.io/br0`
    pub fn resource_name(&self) -> String {
        format!("{}/{}", RESOURCE_NAMESPACE, self.bridge)
    }

    /// Socket file name, relative to the plugin directory
    pub fn socket_name(&self) -> String {
        format!("bridge-{}.sock", self.bridge)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.plugin_dir.join(self.socket_name())
    }
}

/// Run the plugin for one bridge until `shutdown` fires or serving fails.
pub async fn run(
    config: PluginConfig,
    resolver: Arc<dyn ContainerResolver>,
    random: SharedRandom,
    shutdown: watch::Receiver<bool>,
) -> PluginResult<()> {
    tracing::info!(
        "Starting device plugin for bridge {} ({})",
        config.bridge,
        config.resource_name()
    );

    sentinel::ensure_sentinel(&config.sentinel_path)?;

    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let worker_random = random.clone();
    let worker = AttachWorker::spawn(&config, queue_rx, resolver, move || {
        let host = KernelNetns.connect()?;
        Ok(AttachmentEngine::new(KernelNetns, host, worker_random))
    })?;

    let links: Arc<dyn LinkOps> = Arc::new(NetlinkHandle::new()?);
    let allocator = Allocator::new(&config, queue_tx, random);
    let service = DevicePluginService::new(&config, allocator, links);

    serve_with_worker(&config, worker, service, shutdown).await?;

    tracing::info!("Device plugin for bridge {} stopped", config.bridge);
    Ok(())
}

/// Serve once the attach worker is up, and stop serving if it goes away:
/// without it every Allocate would fail.
pub async fn serve_with_worker(
    config: &PluginConfig,
    mut worker: AttachWorker,
    service: DevicePluginService,
    mut shutdown: watch::Receiver<bool>,
) -> PluginResult<()> {
    worker.ready().await?;
    tracing::debug!("Attach worker for {} ready", config.bridge);

    let (stop_tx, stop_rx) = watch::channel(false);
    let serving = server::serve(service, config, stop_rx);
    tokio::pin!(serving);

    let worker_stopped = tokio::select! {
        served = &mut serving => return served,
        _ = server::stop_requested(&mut shutdown) => false,
        _ = worker.stopped() => true,
    };

    let _ = stop_tx.send(true);
    serving.await?;

    if worker_stopped {
        tracing::error!("Attach worker for {} stopped, shutting the plugin down", config.bridge);
        return Err(PluginError::WorkerStopped(config.bridge.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PluginConfig::new("br0");
        assert_eq!(config.pool_size, 100);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.scan_interval, Duration::from_secs(1));
        assert_eq!(config.assignment_timeout, Duration::from_secs(1800));
        assert_eq!(config.sentinel_path, PathBuf::from(FAKE_DEVICE_PATH));
    }

    #[test]
    fn test_names() {
        let mut config = PluginConfig::new("br1");
        config.plugin_dir = PathBuf::from("/run/plugins");
        assert_eq!(config.resource_name(), "bridge.network.kubevirt.io/br1");
        assert_eq!(config.socket_name(), "bridge-br1.sock");
        assert_eq!(config.socket_path(), PathBuf::from("/run/plugins/bridge-br1.sock"));
    }
}
