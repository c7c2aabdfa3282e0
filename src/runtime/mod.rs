//! Container lookup service
//!
//! Maps the correlation path that Allocate asked kubelet to mount back to the
//! running container and its pid. Both lookups are expected to fail for a
//! while after Allocate returns: the container simply doesn't exist yet.

pub mod docker;

use async_trait::async_trait;

pub use docker::DockerResolver;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// No running container mounts the path (yet)
    #[error("no container mounts {0}")]
    ContainerNotFound(String),

    /// Container found but it has no live process
    #[error("container {0} has no running process")]
    PidUnavailable(String),

    /// Container runtime API error
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Resolves assignments to containers and processes.
#[async_trait]
pub trait ContainerResolver: Send + Sync {
    /// ID of the container that currently bind-mounts `path`
    async fn container_by_mount_path(&self, path: &str) -> LookupResult<String>;

    /// Pid of the container's init process
    async fn pid_by_container(&self, container_id: &str) -> LookupResult<u32>;
}
