// In-memory stand-in for the kernel link table and per-thread namespace, used
// by tests that exercise attachment and rollback without privileges.

use crate::network::error::{NetworkError, NetworkResult};
use crate::network::{LinkInfo, LinkKind, LinkOps, NetnsOps, VethRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const HOST_NS: u32 = 1;
const DEFAULT_MTU: u32 = 1500;

#[derive(Debug, Clone)]
pub struct FakeLink {
    pub index: u32,
    pub name: String,
    pub ns: u32,
    pub mtu: u32,
    pub up: bool,
    pub master: Option<u32>,
    pub kind: LinkKind,
    pub peer: Option<u32>,
}

#[derive(Debug)]
struct State {
    links: Vec<FakeLink>,
    next_index: u32,
    next_ns: u32,
    current_ns: u32,
    pids: HashMap<u32, u32>,
    failures: HashSet<String>,
    calls: Vec<String>,
}

impl State {
    /// One-shot failure injection. Matches `op`, `op:arg` or `op@ns`.
    fn check(&mut self, op: &str, arg: &str, ns: u32) -> NetworkResult<()> {
        self.calls.push(format!("{}:{}@{}", op, arg, ns));
        for key in [
            op.to_string(),
            format!("{}:{}", op, arg),
            format!("{}@{}", op, ns),
        ] {
            if self.failures.remove(&key) {
                return Err(NetworkError::Namespace(format!("injected failure: {}", key)));
            }
        }
        Ok(())
    }

    fn find(&self, ns: u32, name: &str) -> Option<&FakeLink> {
        self.links.iter().find(|l| l.ns == ns && l.name == name)
    }

    fn find_index_mut(&mut self, ns: u32, index: u32) -> NetworkResult<&mut FakeLink> {
        self.links
            .iter_mut()
            .find(|l| l.ns == ns && l.index == index)
            .ok_or_else(|| NetworkError::NotFound(format!("link #{}", index)))
    }

    fn push_link(&mut self, name: &str, ns: u32, mtu: u32, kind: LinkKind) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.links.push(FakeLink {
            index,
            name: name.to_string(),
            ns,
            mtu,
            up: false,
            master: None,
            kind,
            peer: None,
        });
        index
    }
}

/// Shared fake kernel; clones observe the same state
#[derive(Clone)]
pub struct FakeKernel {
    state: Arc<Mutex<State>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                links: Vec::new(),
                next_index: 1,
                next_ns: HOST_NS + 1,
                current_ns: HOST_NS,
                pids: HashMap::new(),
                failures: HashSet::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn add_bridge(&self, name: &str, mtu: u32) -> u32 {
        self.state
            .lock()
            .push_link(name, HOST_NS, mtu, LinkKind::Bridge)
    }

    pub fn add_dummy(&self, name: &str) -> u32 {
        self.state.lock().push_link(
            name,
            HOST_NS,
            DEFAULT_MTU,
            LinkKind::Other("dummy".to_string()),
        )
    }

    pub fn remove_link(&self, name: &str) {
        self.state
            .lock()
            .links
            .retain(|l| !(l.ns == HOST_NS && l.name == name));
    }

    /// Register a process living in a fresh namespace; returns the ns id
    pub fn add_process(&self, pid: u32) -> u32 {
        let mut state = self.state.lock();
        let ns = state.next_ns;
        state.next_ns += 1;
        state.pids.insert(pid, ns);
        ns
    }

    pub fn fail_on(&self, key: &str) {
        self.state.lock().failures.insert(key.to_string());
    }

    pub fn current_ns(&self) -> u32 {
        self.state.lock().current_ns
    }

    pub fn link(&self, ns: u32, name: &str) -> Option<FakeLink> {
        self.state.lock().find(ns, name).cloned()
    }

    pub fn links_in(&self, ns: u32) -> Vec<FakeLink> {
        self.state
            .lock()
            .links
            .iter()
            .filter(|l| l.ns == ns)
            .cloned()
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn host_links(&self) -> FakeLinks {
        FakeLinks {
            state: self.state.clone(),
            ns: HOST_NS,
        }
    }

    pub fn netns(&self) -> FakeNetns {
        FakeNetns {
            state: self.state.clone(),
        }
    }
}

/// Link operations bound to one namespace, like a netlink socket
#[derive(Clone)]
pub struct FakeLinks {
    state: Arc<Mutex<State>>,
    ns: u32,
}

#[async_trait]
impl LinkOps for FakeLinks {
    async fn link_by_name(&self, name: &str) -> NetworkResult<LinkInfo> {
        let mut state = self.state.lock();
        state.check("link_by_name", name, self.ns)?;
        state
            .find(self.ns, name)
            .map(|l| LinkInfo {
                index: l.index,
                name: l.name.clone(),
                mtu: l.mtu,
                kind: Some(l.kind.clone()),
                netns_id: None,
            })
            .ok_or_else(|| NetworkError::NotFound(format!("link {}", name)))
    }

    async fn add_veth(&self, request: &VethRequest) -> NetworkResult<()> {
        let mut state = self.state.lock();
        state.check("add_veth", &request.host_name, self.ns)?;
        if state.find(self.ns, &request.host_name).is_some()
            || state.find(self.ns, &request.peer_name).is_some()
        {
            return Err(NetworkError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "File exists",
            )));
        }
        if !state
            .links
            .iter()
            .any(|l| l.ns == self.ns && l.index == request.master_index)
        {
            return Err(NetworkError::NotFound(format!(
                "master #{}",
                request.master_index
            )));
        }

        let host = state.push_link(&request.host_name, self.ns, request.mtu, LinkKind::Veth);
        let peer = state.push_link(&request.peer_name, self.ns, DEFAULT_MTU, LinkKind::Veth);
        for link in state.links.iter_mut() {
            if link.index == host {
                link.master = Some(request.master_index);
                link.peer = Some(peer);
            } else if link.index == peer {
                link.peer = Some(host);
            }
        }
        Ok(())
    }

    async fn set_link_up(&self, index: u32) -> NetworkResult<()> {
        let mut state = self.state.lock();
        state.check("set_link_up", &index.to_string(), self.ns)?;
        state.find_index_mut(self.ns, index)?.up = true;
        Ok(())
    }

    async fn set_link_mtu(&self, index: u32, mtu: u32) -> NetworkResult<()> {
        let mut state = self.state.lock();
        state.check("set_link_mtu", &index.to_string(), self.ns)?;
        state.find_index_mut(self.ns, index)?.mtu = mtu;
        Ok(())
    }

    async fn set_link_netns_by_pid(&self, index: u32, pid: u32) -> NetworkResult<()> {
        let mut state = self.state.lock();
        state.check("set_link_netns_by_pid", &pid.to_string(), self.ns)?;
        let target = *state
            .pids
            .get(&pid)
            .ok_or_else(|| NetworkError::Namespace(format!("no process {}", pid)))?;
        state.find_index_mut(self.ns, index)?.ns = target;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> NetworkResult<()> {
        let mut state = self.state.lock();
        state.check("delete_link", name, self.ns)?;
        let Some(link) = state.find(self.ns, name).cloned() else {
            return Ok(());
        };
        // Removing one end of a veth pair takes the peer with it
        state
            .links
            .retain(|l| l.index != link.index && Some(l.index) != link.peer);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeNs(pub u32);

#[derive(Clone)]
pub struct FakeNetns {
    state: Arc<Mutex<State>>,
}

impl NetnsOps for FakeNetns {
    type Handle = FakeNs;
    type Links = FakeLinks;

    fn current(&self) -> NetworkResult<FakeNs> {
        let mut state = self.state.lock();
        let ns = state.current_ns;
        state.check("current", "", ns)?;
        Ok(FakeNs(ns))
    }

    fn from_pid(&self, pid: u32) -> NetworkResult<FakeNs> {
        let mut state = self.state.lock();
        let ns = state.current_ns;
        state.check("from_pid", &pid.to_string(), ns)?;
        state
            .pids
            .get(&pid)
            .map(|ns| FakeNs(*ns))
            .ok_or_else(|| NetworkError::Namespace(format!("no process {}", pid)))
    }

    fn enter(&self, ns: &FakeNs) -> NetworkResult<()> {
        let mut state = self.state.lock();
        let current = state.current_ns;
        state.check("enter", &ns.0.to_string(), current)?;
        state.current_ns = ns.0;
        Ok(())
    }

    fn connect(&self) -> NetworkResult<FakeLinks> {
        let mut state = self.state.lock();
        let ns = state.current_ns;
        state.check("connect", "", ns)?;
        Ok(FakeLinks {
            state: self.state.clone(),
            ns,
        })
    }
}
