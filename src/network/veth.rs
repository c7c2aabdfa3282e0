// Veth attachment: wires one end of a fresh veth pair into a host bridge and
// moves the other end into a container's network namespace.

use crate::network::error::{NetworkError, NetworkResult};
use crate::network::namespace::NetnsGuard;
use crate::network::{LinkOps, NetnsOps, VethRequest};
use crate::utils::random::{self, SharedRandom};
use async_trait::async_trait;

/// Physically attach a container to a bridge.
#[async_trait]
pub trait Attach: Send + Sync {
    /// Create a veth pair on `bridge` and hand the end named `nic` to the
    /// network namespace of `pid`. All partial state is removed on error.
    async fn attach(&self, bridge: &str, nic: &str, pid: u32) -> NetworkResult<()>;
}

/// Attachment sequence over netlink and setns.
///
/// Must be driven from a single dedicated thread: the namespace switch in the
/// middle of the sequence changes that thread's ambient state.
pub struct AttachmentEngine<N: NetnsOps> {
    netns: N,
    /// Link operations bound to the host namespace. Stays valid while the
    /// thread is inside a container namespace, which is what rollback needs.
    host: N::Links,
    random: SharedRandom,
}

impl<N: NetnsOps> AttachmentEngine<N> {
    pub fn new(netns: N, host: N::Links, random: SharedRandom) -> Self {
        Self {
            netns,
            host,
            random,
        }
    }

    /// Everything after the veth pair exists. Any error here means the pair
    /// must be deleted by the caller; the namespace guard has already put the
    /// thread back by the time an error is returned.
    async fn wire_pair(&self, request: &VethRequest, pid: u32) -> NetworkResult<()> {
        let host = self.host.link_by_name(&request.host_name).await?;
        self.host.set_link_up(host.index).await?;

        let peer = self.host.link_by_name(&request.peer_name).await?;
        self.host.set_link_netns_by_pid(peer.index, pid).await?;

        let original = self.netns.current()?;
        let target = self.netns.from_pid(pid)?;
        let _guard = NetnsGuard::enter(&self.netns, &original, &target)?;

        // Fresh connection: the host handle would still talk to the host
        let links = self.netns.connect()?;
        let peer = links.link_by_name(&request.peer_name).await?;
        links.set_link_mtu(peer.index, request.mtu).await?;
        links.set_link_up(peer.index).await?;

        Ok(())
    }

    /// Deleting the host end removes its peer too, wherever the peer lives.
    async fn rollback(&self, host_name: &str) {
        match self.host.delete_link(host_name).await {
            Ok(()) => tracing::debug!("Rolled back veth {}", host_name),
            Err(e) => tracing::warn!("Failed to roll back veth {}: {}", host_name, e),
        }
    }
}

#[async_trait]
impl<N: NetnsOps> Attach for AttachmentEngine<N> {
    async fn attach(&self, bridge_name: &str, nic: &str, pid: u32) -> NetworkResult<()> {
        let host_name = random::interface_name(&self.random);

        // Expected to exist, but the bridge can vanish between probe and use
        let bridge = self.host.link_by_name(bridge_name).await?;
        if !bridge.is_bridge() {
            return Err(NetworkError::NotABridge(bridge_name.to_string()));
        }

        let request = VethRequest {
            host_name,
            peer_name: nic.to_string(),
            master_index: bridge.index,
            mtu: bridge.mtu,
            netns_id: bridge.netns_id,
        };
        self.host.add_veth(&request).await?;
        tracing::debug!(
            "Created veth {} <-> {} on bridge {} (mtu {})",
            request.host_name,
            request.peer_name,
            bridge.name,
            request.mtu
        );

        if let Err(e) = self.wire_pair(&request, pid).await {
            self.rollback(&request.host_name).await;
            return Err(e);
        }

        tracing::debug!(
            "Interface {} is up in namespace of pid {}",
            request.peer_name,
            pid
        );
        Ok(())
    }
}
