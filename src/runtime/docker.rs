use crate::runtime::{ContainerResolver, LookupError, LookupResult};
use async_trait::async_trait;
use bollard::models::ContainerInspectResponse;
use bollard::query_parameters::{ListContainersOptions, ListContainersOptionsBuilder};
use bollard::Docker;

/// Seconds before a Docker API call is abandoned
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Resolver backed by the Docker engine API.
///
/// The correlation path reaches Docker as a device mapping
/// (`HostConfig.Devices[].PathInContainer`), since kubelet passes the
/// sentinel device through the runtime's device list.
pub struct DockerResolver {
    docker: Docker,
}

impl DockerResolver {
    /// Connect to `socket` if given, otherwise use bollard's local defaults
    /// (DOCKER_HOST or /var/run/docker.sock).
    pub fn connect(socket: Option<&str>) -> LookupResult<Self> {
        let docker = match socket {
            Some(path) => {
                Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        tracing::info!("Connected to container runtime for assignment lookups");
        Ok(Self { docker })
    }

    async fn inspect(&self, id: &str) -> LookupResult<ContainerInspectResponse> {
        self.docker
            .inspect_container(
                id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => LookupError::ContainerNotFound(id.to_string()),
                e => LookupError::Docker(e),
            })
    }
}

#[async_trait]
impl ContainerResolver for DockerResolver {
    async fn container_by_mount_path(&self, path: &str) -> LookupResult<String> {
        let containers = self
            .docker
            .list_containers(Some(running_containers()))
            .await?;

        for summary in containers {
            let Some(id) = summary.id else { continue };
            let inspect = match self.inspect(&id).await {
                Ok(inspect) => inspect,
                // Raced with container removal
                Err(LookupError::ContainerNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if mounts_device_path(&inspect, path) {
                return Ok(id);
            }
        }

        Err(LookupError::ContainerNotFound(path.to_string()))
    }

    async fn pid_by_container(&self, container_id: &str) -> LookupResult<u32> {
        let inspect = self.inspect(container_id).await?;
        container_pid(&inspect)
            .ok_or_else(|| LookupError::PidUnavailable(container_id.to_string()))
    }
}

/// Only running containers can have a pid to attach to
fn running_containers() -> ListContainersOptions {
    ListContainersOptionsBuilder::default().all(false).build()
}

fn mounts_device_path(inspect: &ContainerInspectResponse, path: &str) -> bool {
    inspect
        .host_config
        .as_ref()
        .and_then(|hc| hc.devices.as_ref())
        .map(|devices| {
            devices
                .iter()
                .any(|d| d.path_in_container.as_deref() == Some(path))
        })
        .unwrap_or(false)
}

/// Docker reports pid 0 for containers that are created but not running
fn container_pid(inspect: &ContainerInspectResponse) -> Option<u32> {
    inspect
        .state
        .as_ref()
        .and_then(|s| s.pid)
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
}
