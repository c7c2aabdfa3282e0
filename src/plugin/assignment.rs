// Assignment pipeline: correlates Allocate calls with the containers that
// eventually mount the assignment path, then attaches them to the bridge.

use crate::network::veth::Attach;
use crate::network::NetworkResult;
use crate::plugin::{PluginConfig, PluginError, PluginResult};
use crate::runtime::ContainerResolver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::oneshot;

/// Pending record linking one allocated device to the container that will
/// later mount `container_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub device_id: String,
    pub container_path: String,
    pub created: Instant,
}

/// What one scan did with an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Expired,
    Waiting,
    Attached,
    AttachFailed,
}

impl ScanOutcome {
    fn keeps(self) -> bool {
        self == ScanOutcome::Waiting
    }
}

pub struct AssignmentPipeline<A: Attach> {
    bridge: String,
    queue: mpsc::Receiver<Assignment>,
    pending: Vec<Assignment>,
    resolver: Arc<dyn ContainerResolver>,
    attacher: A,
    scan_interval: Duration,
    timeout: Duration,
}

impl<A: Attach> AssignmentPipeline<A> {
    pub fn new(
        config: &PluginConfig,
        queue: mpsc::Receiver<Assignment>,
        resolver: Arc<dyn ContainerResolver>,
        attacher: A,
    ) -> Self {
        Self {
            bridge: config.bridge.clone(),
            queue,
            pending: Vec::new(),
            resolver,
            attacher,
            scan_interval: config.scan_interval,
            timeout: config.assignment_timeout,
        }
    }

    /// Drain the queue one record at a time, scanning the pending list after
    /// each step. Returns once every sender is gone and nothing is pending.
    pub async fn run(mut self) {
        tracing::debug!("Assignment pipeline for {} started", self.bridge);

        loop {
            match self.queue.try_recv() {
                Ok(assignment) => {
                    tracing::debug!("Tracking assignment of {}", assignment.device_id);
                    self.pending.push(assignment);
                }
                Err(TryRecvError::Empty) => tokio::time::sleep(self.scan_interval).await,
                Err(TryRecvError::Disconnected) => {
                    if self.pending.is_empty() {
                        tracing::debug!("Assignment pipeline for {} finished", self.bridge);
                        return;
                    }
                    tokio::time::sleep(self.scan_interval).await;
                }
            }

            self.scan(Instant::now()).await;
        }
    }

    /// One pass over the pending list in insertion order. A waiting entry
    /// never blocks the ones behind it.
    pub async fn scan(&mut self, now: Instant) {
        let pending = std::mem::take(&mut self.pending);

        for assignment in pending {
            if self.process(&assignment, now).await.keeps() {
                self.pending.push(assignment);
            }
        }
    }

    async fn process(&self, assignment: &Assignment, now: Instant) -> ScanOutcome {
        if now.saturating_duration_since(assignment.created) > self.timeout {
            tracing::warn!(
                "Assignment of {} expired before any container mounted {}",
                assignment.device_id,
                assignment.container_path
            );
            return ScanOutcome::Expired;
        }

        let container = match self
            .resolver
            .container_by_mount_path(&assignment.container_path)
            .await
        {
            Ok(container) => container,
            Err(e) => {
                tracing::debug!("No container for {} yet: {}", assignment.device_id, e);
                return ScanOutcome::Waiting;
            }
        };

        let pid = match self.resolver.pid_by_container(&container).await {
            Ok(pid) => pid,
            Err(e) => {
                tracing::debug!("No pid for container {} yet: {}", container, e);
                return ScanOutcome::Waiting;
            }
        };

        match self
            .attacher
            .attach(&self.bridge, &assignment.device_id, pid)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Attached {} to bridge {} in container {} (pid {})",
                    assignment.device_id,
                    self.bridge,
                    container,
                    pid
                );
                ScanOutcome::Attached
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to attach {} to bridge {} in container {}: {}",
                    assignment.device_id,
                    self.bridge,
                    container,
                    e
                );
                ScanOutcome::AttachFailed
            }
        }
    }
}

/// Attach worker for one bridge, running on its own OS thread.
///
/// The attachment engine switches the calling thread into container network
/// namespaces, so it gets a thread and a single-threaded runtime of its own
/// and nothing else is ever scheduled there.
pub struct AttachWorker {
    bridge: String,
    ready: oneshot::Receiver<PluginResult<()>>,
    exited: oneshot::Receiver<()>,
}

impl AttachWorker {
    /// Start the worker thread. `setup` runs on that thread inside its
    /// runtime and builds the attacher; its outcome is reported through
    /// [`AttachWorker::ready`].
    pub fn spawn<A, F>(
        config: &PluginConfig,
        queue: mpsc::Receiver<Assignment>,
        resolver: Arc<dyn ContainerResolver>,
        setup: F,
    ) -> PluginResult<Self>
    where
        A: Attach + 'static,
        F: FnOnce() -> NetworkResult<A> + Send + 'static,
    {
        let config = config.clone();
        let bridge = config.bridge.clone();
        let (ready_tx, ready) = oneshot::channel();
        let (exited_tx, exited) = oneshot::channel::<()>();

        std::thread::Builder::new()
            .name(format!("attach-{}", config.bridge))
            .spawn(move || {
                // Dropped when the thread ends, panics included
                let _exited = exited_tx;

                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("Failed to start attach runtime for {}: {}", config.bridge, e);
                        let _ = ready_tx.send(Err(PluginError::Io(e)));
                        return;
                    }
                };

                rt.block_on(async move {
                    let attacher = match setup() {
                        Ok(attacher) => attacher,
                        Err(e) => {
                            tracing::error!("Failed to set up attach worker for {}: {}", config.bridge, e);
                            let _ = ready_tx.send(Err(PluginError::Network(e)));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    AssignmentPipeline::new(&config, queue, resolver, attacher)
                        .run()
                        .await;
                });
            })?;

        Ok(Self {
            bridge,
            ready,
            exited,
        })
    }

    /// Wait until the worker can take assignments. Fails with the setup
    /// error, or with `WorkerStopped` if the thread died before reporting.
    pub async fn ready(&mut self) -> PluginResult<()> {
        match (&mut self.ready).await {
            Ok(result) => result,
            Err(_) => Err(PluginError::WorkerStopped(self.bridge.clone())),
        }
    }

    /// Resolves once the worker thread has ended, for whatever reason.
    pub async fn stopped(&mut self) {
        let _ = (&mut self.exited).await;
    }
}
