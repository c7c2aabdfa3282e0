use crate::network::error::{NetworkError, NetworkResult};
use crate::network::{LinkInfo, LinkKind, LinkOps, VethRequest};
use async_trait::async_trait;
use futures::TryStreamExt;
use netlink_packet_route::link::nlas::{Info, InfoKind, Nla as LinkNla};
use netlink_packet_route::LinkMessage;

/// Netlink handle wrapping rtnetlink for bridge/veth/link operations.
///
/// The underlying socket belongs to the network namespace that was current on
/// the creating thread, so one handle per namespace is needed.
pub struct NetlinkHandle {
    handle: rtnetlink::Handle,
    conn_task: tokio::task::JoinHandle<()>,
}

impl NetlinkHandle {
    /// Open a netlink connection in the calling thread's namespace.
    /// Must be called from inside a tokio runtime.
    pub fn new() -> NetworkResult<Self> {
        let (conn, handle, _) = rtnetlink::new_connection()?;
        let conn_task = tokio::spawn(conn);
        Ok(Self { handle, conn_task })
    }
}

impl Drop for NetlinkHandle {
    fn drop(&mut self) {
        self.conn_task.abort();
    }
}

#[async_trait]
impl LinkOps for NetlinkHandle {
    /// Get a link by name. Returns NotFound if the link doesn't exist.
    async fn link_by_name(&self, name: &str) -> NetworkResult<LinkInfo> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match links.try_next().await {
            Ok(Some(msg)) => Ok(link_info(&msg)),
            Ok(None) => Err(NetworkError::NotFound(format!("link {}", name))),
            Err(e) => {
                // rtnetlink returns an error for "not found" on some kernels
                if e.to_string().contains("No such device") {
                    Err(NetworkError::NotFound(format!("link {}", name)))
                } else {
                    Err(NetworkError::Netlink(e))
                }
            }
        }
    }

    /// Create a veth pair with the host end already enslaved to the bridge
    async fn add_veth(&self, request: &VethRequest) -> NetworkResult<()> {
        let mut add = self
            .handle
            .link()
            .add()
            .veth(request.host_name.clone(), request.peer_name.clone());

        let nlas = &mut add.message_mut().nlas;
        nlas.push(LinkNla::Master(request.master_index));
        nlas.push(LinkNla::Mtu(request.mtu));
        if let Some(id) = request.netns_id {
            nlas.push(LinkNla::NetnsId(id));
        }

        add.execute().await.map_err(NetworkError::Netlink)
    }

    async fn set_link_up(&self, index: u32) -> NetworkResult<()> {
        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(NetworkError::Netlink)
    }

    async fn set_link_mtu(&self, index: u32, mtu: u32) -> NetworkResult<()> {
        self.handle
            .link()
            .set(index)
            .mtu(mtu)
            .execute()
            .await
            .map_err(NetworkError::Netlink)
    }

    /// Move a link to the network namespace of a process
    async fn set_link_netns_by_pid(&self, index: u32, pid: u32) -> NetworkResult<()> {
        self.handle
            .link()
            .set(index)
            .setns_by_pid(pid)
            .execute()
            .await
            .map_err(NetworkError::Netlink)
    }

    async fn delete_link(&self, name: &str) -> NetworkResult<()> {
        let index = match self.link_by_name(name).await {
            Ok(link) => link.index,
            Err(NetworkError::NotFound(_)) => return Ok(()), // already gone
            Err(e) => return Err(e),
        };

        match self.handle.link().del(index).execute().await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("No such device") => Ok(()),
            Err(e) => Err(NetworkError::Netlink(e)),
        }
    }
}

fn link_info(msg: &LinkMessage) -> LinkInfo {
    let mut info = LinkInfo {
        index: msg.header.index,
        name: String::new(),
        mtu: 0,
        kind: None,
        netns_id: None,
    };

    for nla in &msg.nlas {
        match nla {
            LinkNla::IfName(name) => info.name = name.clone(),
            LinkNla::Mtu(mtu) => info.mtu = *mtu,
            LinkNla::NetnsId(id) => info.netns_id = Some(*id),
            LinkNla::Info(infos) => {
                for i in infos {
                    if let Info::Kind(kind) = i {
                        info.kind = Some(match kind {
                            InfoKind::Bridge => LinkKind::Bridge,
                            InfoKind::Veth => LinkKind::Veth,
                            other => LinkKind::Other(format!("{:?}", other).to_lowercase()),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    info
}
