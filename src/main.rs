// Kubelet device plugin exposing Linux bridges as allocatable resources.
// Each bridge gets its own plugin socket, device pool and attach worker.

mod grpc;
mod network;
mod plugin;
mod runtime;
mod utils;

use clap::Parser;
use plugin::PluginConfig;
use runtime::{ContainerResolver, DockerResolver};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;
use utils::constants::{
    ASSIGNMENT_QUEUE_CAPACITY, DEVICE_PLUGIN_DIR, FAKE_DEVICE_PATH, NICS_POOL_SIZE,
};
use utils::{logger, random};

// Include the generated protobuf code
pub mod v1beta1 {
    tonic::include_proto!("v1beta1");
}

/// Network bridge device plugin
#[derive(Parser, Debug)]
#[clap(author, version, about = "Exposes host bridges to pods as kubelet device plugin resources")]
struct Cli {
    /// Bridges to expose, comma separated
    #[clap(long, env = "BRIDGES", value_delimiter = ',', required = true)]
    bridges: Vec<String>,

    /// Kubelet device plugin directory
    #[clap(long, env = "DEVICE_PLUGIN_DIR", default_value = DEVICE_PLUGIN_DIR)]
    plugin_dir: PathBuf,

    /// Placeholder block device mounted into containers
    #[clap(long, default_value = FAKE_DEVICE_PATH)]
    sentinel_path: PathBuf,

    /// Ports advertised per bridge
    #[clap(long, default_value_t = NICS_POOL_SIZE)]
    pool_size: usize,

    /// Pending assignments buffered per bridge before Allocate waits
    #[clap(long, default_value_t = ASSIGNMENT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Docker daemon socket (defaults to the local daemon)
    #[clap(long, env = "DOCKER_HOST")]
    docker_socket: Option<String>,

    /// Enable verbose output
    #[clap(long)]
    verbose: bool,
}

impl Cli {
    fn bridge_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.bridges.iter().map(|b| b.trim()) {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn plugin_config(&self, bridge: &str) -> PluginConfig {
        let mut config = PluginConfig::new(bridge);
        config.plugin_dir = self.plugin_dir.clone();
        config.sentinel_path = self.sentinel_path.clone();
        config.pool_size = self.pool_size;
        config.queue_capacity = self.queue_capacity.max(1);
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let bridges = cli.bridge_names();
    if bridges.is_empty() {
        return Err("no bridges configured".into());
    }

    let resolver: Arc<dyn ContainerResolver> =
        Arc::new(DockerResolver::connect(cli.docker_socket.as_deref())?);
    let random = random::shared(random::SeededRandom::from_os());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut plugins = JoinSet::new();
    for bridge in &bridges {
        let config = cli.plugin_config(bridge);
        plugins.spawn(plugin::run(
            config,
            resolver.clone(),
            random.clone(),
            shutdown_rx.clone(),
        ));
    }
    tracing::info!("Serving {} bridge(s): {}", bridges.len(), bridges.join(", "));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut failed = false;
    loop {
        tokio::select! {
            received = shutdown_signal(&mut sigterm) => {
                tracing::info!("Received {}, stopping plugins", received);
                break;
            }
            joined = plugins.join_next() => match joined {
                Some(result) => failed |= !report(result),
                None => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(result) = plugins.join_next().await {
        failed |= !report(result);
    }

    if failed {
        return Err("one or more bridge plugins failed".into());
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM (how kubelet stops a DaemonSet pod).
async fn shutdown_signal(sigterm: &mut Signal) -> &'static str {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

fn report(result: Result<plugin::PluginResult<()>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!("Bridge plugin failed: {}", e);
            false
        }
        Err(e) => {
            tracing::error!("Bridge plugin task panicked: {}", e);
            false
        }
    }
}
