// Host network plumbing for the bridge plugin.
// Netlink link operations, per-thread namespace switching, the bridge prober
// and the veth attachment sequence.

pub mod bridge;
pub mod error;
pub mod namespace;
pub mod netlink;
pub mod veth;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

pub use error::{NetworkError, NetworkResult};

/// Kind of a link as reported by IFLA_INFO_KIND
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Bridge,
    Veth,
    Other(String),
}

/// Snapshot of the link attributes the plugin cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    pub mtu: u32,
    pub kind: Option<LinkKind>,
    /// IFLA_LINK_NETNSID, only reported for links whose peer lives elsewhere
    pub netns_id: Option<i32>,
}

impl LinkInfo {
    pub fn is_bridge(&self) -> bool {
        self.kind == Some(LinkKind::Bridge)
    }
}

/// Parameters for creating a veth pair whose host end is a bridge port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethRequest {
    pub host_name: String,
    pub peer_name: String,
    pub master_index: u32,
    pub mtu: u32,
    pub netns_id: Option<i32>,
}

/// Link operations against the namespace a handle was opened in.
///
/// A netlink socket stays bound to the namespace that was current when it
/// was created, even if the calling thread later switches elsewhere.
#[async_trait]
pub trait LinkOps: Send + Sync {
    async fn link_by_name(&self, name: &str) -> NetworkResult<LinkInfo>;

    async fn add_veth(&self, request: &VethRequest) -> NetworkResult<()>;

    async fn set_link_up(&self, index: u32) -> NetworkResult<()>;

    async fn set_link_mtu(&self, index: u32, mtu: u32) -> NetworkResult<()>;

    async fn set_link_netns_by_pid(&self, index: u32, pid: u32) -> NetworkResult<()>;

    /// Delete a link by name. Idempotent: a missing link is not an error.
    async fn delete_link(&self, name: &str) -> NetworkResult<()>;
}

/// Network namespace access for the calling thread.
pub trait NetnsOps: Send + Sync {
    type Handle: Send + Sync;
    type Links: LinkOps;

    /// The namespace the calling thread is in right now
    fn current(&self) -> NetworkResult<Self::Handle>;

    /// The namespace of a process
    fn from_pid(&self, pid: u32) -> NetworkResult<Self::Handle>;

    /// Switch the calling thread into `ns`
    fn enter(&self, ns: &Self::Handle) -> NetworkResult<()>;

    /// Open link operations bound to the calling thread's current namespace
    fn connect(&self) -> NetworkResult<Self::Links>;
}
