// ListAndWatch: republish the device pool whenever the bridge appears or
// disappears.

use crate::network::bridge::bridge_exists;
use crate::network::LinkOps;
use crate::utils::constants::HEALTHY;
use crate::v1beta1::{Device, ListAndWatchResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::Status;

/// Every slot of the pool, healthy. IDs are `<bridge>-<index>` with at least
/// two digits.
pub fn device_pool(bridge: &str, size: usize) -> Vec<Device> {
    (0..size)
        .map(|i| Device {
            id: format!("{}-{:02}", bridge, i),
            health: HEALTHY.to_string(),
        })
        .collect()
}

/// Advertised state of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Present,
    Absent,
}

impl From<bool> for PoolState {
    fn from(exists: bool) -> Self {
        if exists {
            PoolState::Present
        } else {
            PoolState::Absent
        }
    }
}

/// Remembers the last state sent so only transitions are emitted.
#[derive(Debug, Default)]
pub struct PoolTracker {
    last: Option<PoolState>,
}

impl PoolTracker {
    /// Feed one observation. Returns the state to emit, if any: always on
    /// the first observation, afterwards only when it differs from the last
    /// emitted one.
    pub fn observe(&mut self, exists: bool) -> Option<PoolState> {
        let state = PoolState::from(exists);
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }
}

/// Long-lived poller behind one ListAndWatch stream.
pub struct DeviceAdvertiser {
    bridge: String,
    devices: Vec<Device>,
    poll_interval: Duration,
    links: Arc<dyn LinkOps>,
}

impl DeviceAdvertiser {
    pub fn new(
        bridge: String,
        pool_size: usize,
        poll_interval: Duration,
        links: Arc<dyn LinkOps>,
    ) -> Self {
        let devices = device_pool(&bridge, pool_size);
        Self {
            bridge,
            devices,
            poll_interval,
            links,
        }
    }

    fn response(&self, state: PoolState) -> ListAndWatchResponse {
        match state {
            PoolState::Present => ListAndWatchResponse {
                devices: self.devices.clone(),
            },
            PoolState::Absent => ListAndWatchResponse { devices: vec![] },
        }
    }

    /// Poll until the stream goes away. Sends the current state immediately,
    /// then one message per bridge transition.
    pub async fn run(self, tx: mpsc::Sender<Result<ListAndWatchResponse, Status>>) {
        let mut tracker = PoolTracker::default();

        loop {
            let exists = bridge_exists(self.links.as_ref(), &self.bridge).await;
            if let Some(state) = tracker.observe(exists) {
                match state {
                    PoolState::Present => tracing::info!(
                        "Bridge {} exists, advertising {} ports",
                        self.bridge,
                        self.devices.len()
                    ),
                    PoolState::Absent => tracing::info!(
                        "Bridge {} does not exist, advertising no ports",
                        self.bridge
                    ),
                }

                if tx.send(Ok(self.response(state))).await.is_err() {
                    tracing::debug!("ListAndWatch stream for {} closed", self.bridge);
                    return;
                }
            }

            if tx.is_closed() {
                tracing::debug!("ListAndWatch stream for {} closed", self.bridge);
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
