// Unix socket plumbing: serve the plugin on its socket in the kubelet
// plugin directory and announce it through kubelet.sock.

use crate::grpc::device_plugin::DevicePluginService;
use crate::plugin::{PluginConfig, PluginError, PluginResult};
use crate::utils::constants::{DEVICE_PLUGIN_API_VERSION, KUBELET_SOCKET};
use crate::v1beta1::device_plugin_server::DevicePluginServer;
use crate::v1beta1::registration_client::RegistrationClient;
use crate::v1beta1::{DevicePluginOptions, RegisterRequest};
use hyper_util::rt::TokioIo;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::{Channel, Endpoint, Server, Uri};
use tower::service_fn;

/// Open a gRPC channel over a unix socket. The URI is a placeholder, every
/// connection goes to `path`.
pub async fn connect_unix(path: impl Into<PathBuf>) -> Result<Channel, tonic::transport::Error> {
    let path = path.into();
    Endpoint::try_from("http://[::]:50051")?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
        }))
        .await
}

/// Bind a listener at `path`, replacing a stale socket left by a previous
/// run.
pub fn bind_unix(path: &Path) -> PluginResult<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed stale socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(PluginError::Io(e)),
    }
    Ok(UnixListener::bind(path)?)
}

/// Announce the plugin's socket and resource name to kubelet.
pub async fn register_with_kubelet(config: &PluginConfig) -> PluginResult<()> {
    let kubelet_socket = config.plugin_dir.join(KUBELET_SOCKET);
    let channel = connect_unix(kubelet_socket.clone()).await?;
    let mut client = RegistrationClient::new(channel);

    client
        .register(RegisterRequest {
            version: DEVICE_PLUGIN_API_VERSION.to_string(),
            endpoint: config.socket_name(),
            resource_name: config.resource_name(),
            options: Some(DevicePluginOptions {
                pre_start_required: false,
            }),
        })
        .await?;

    tracing::info!(
        "Registered {} with kubelet at {}",
        config.resource_name(),
        kubelet_socket.display()
    );
    Ok(())
}

/// Resolves once `shutdown` carries `true` or its sender is gone.
pub async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Serve `service` on the plugin socket and register it. Returns when
/// `shutdown` fires, or with an error if registration or the server fails.
pub async fn serve(
    service: DevicePluginService,
    config: &PluginConfig,
    mut shutdown: watch::Receiver<bool>,
) -> PluginResult<()> {
    let socket_path = config.socket_path();
    let listener = bind_unix(&socket_path)?;
    tracing::info!("Device plugin for {} listening on {}", config.bridge, socket_path.display());

    let server = tokio::spawn(
        Server::builder()
            .add_service(DevicePluginServer::new(service))
            .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                stop_requested(&mut shutdown).await;
            }),
    );

    if let Err(e) = register_with_kubelet(config).await {
        tracing::error!("Failed to register {} with kubelet: {}", config.resource_name(), e);
        server.abort();
        let _ = std::fs::remove_file(&socket_path);
        return Err(e);
    }

    let served = server.await;
    let _ = std::fs::remove_file(&socket_path);

    match served {
        Ok(result) => Ok(result?),
        Err(e) => Err(PluginError::Io(std::io::Error::other(e))),
    }
}
