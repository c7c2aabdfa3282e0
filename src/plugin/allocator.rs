// Allocate: answer kubelet synchronously and leave the wiring to the
// assignment pipeline.

use crate::plugin::assignment::Assignment;
use crate::plugin::{PluginConfig, PluginError, PluginResult};
use crate::utils::constants::{ASSIGNMENT_PATH_ROOT, PROTOCOL_ETHERNET};
use crate::utils::random::{self, SharedRandom};
use crate::v1beta1::{AllocateRequest, AllocateResponse, ContainerAllocateResponse, DeviceSpec};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

/// One interface as seen from inside the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vnic {
    pub name: String,
    pub protocol: String,
}

/// Payload of the per-container env var
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceResources {
    pub name: String,
    pub interfaces: Vec<Vnic>,
}

/// Path the container sees for a device; doubles as the key used to find the
/// container again once it runs.
pub fn assignment_path(bridge: &str, nic: &str) -> String {
    format!("{}/{}/{}", ASSIGNMENT_PATH_ROOT, bridge, nic)
}

pub struct Allocator {
    bridge: String,
    resource_name: String,
    sentinel_path: PathBuf,
    queue: mpsc::Sender<Assignment>,
    random: SharedRandom,
}

impl Allocator {
    pub fn new(config: &PluginConfig, queue: mpsc::Sender<Assignment>, random: SharedRandom) -> Self {
        Self {
            bridge: config.bridge.clone(),
            resource_name: config.resource_name(),
            sentinel_path: config.sentinel_path.clone(),
            queue,
            random,
        }
    }

    /// Build one response per container request and enqueue one assignment
    /// per device. Never touches the network.
    pub async fn allocate(&self, request: AllocateRequest) -> PluginResult<AllocateResponse> {
        let mut response = AllocateResponse::default();
        let mut env_names = HashSet::new();
        let host_path = self.sentinel_path.to_string_lossy().into_owned();

        for container_request in request.container_requests {
            let mut devices = Vec::with_capacity(container_request.devices_ids.len());
            let mut interfaces = Vec::with_capacity(container_request.devices_ids.len());

            for device_id in container_request.devices_ids {
                let container_path = assignment_path(&self.bridge, &device_id);
                devices.push(DeviceSpec {
                    container_path: container_path.clone(),
                    host_path: host_path.clone(),
                    permissions: "r".to_string(),
                });
                interfaces.push(Vnic {
                    name: device_id.clone(),
                    protocol: PROTOCOL_ETHERNET.to_string(),
                });

                tracing::debug!("Queueing assignment of {} at {}", device_id, container_path);
                let assignment = Assignment {
                    device_id,
                    container_path,
                    created: Instant::now(),
                };
                // Waits for room rather than dropping when the worker lags
                self.queue
                    .send(assignment)
                    .await
                    .map_err(|e| PluginError::QueueClosed(e.0.device_id))?;
            }

            let resources = NetworkInterfaceResources {
                name: self.resource_name.clone(),
                interfaces,
            };
            let payload = match serde_json::to_string(&resources) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("Failed to serialize interface resources: {}", e);
                    continue;
                }
            };

            let mut env_name = random::env_var_name(&self.random);
            while !env_names.insert(env_name.clone()) {
                env_name = random::env_var_name(&self.random);
            }

            response.container_responses.push(ContainerAllocateResponse {
                envs: HashMap::from([(env_name, payload)]),
                devices,
                ..Default::default()
            });
        }

        Ok(response)
    }
}
