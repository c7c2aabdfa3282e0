// Per-thread network namespace switching.
// setns() only affects the calling OS thread, so everything here must run on
// the dedicated attach worker thread, never on a pooled tokio worker.

use crate::network::error::{NetworkError, NetworkResult};
use crate::network::netlink::NetlinkHandle;
use crate::network::NetnsOps;
use nix::sched::{setns, CloneFlags};
use std::fs::File;

/// Open network namespace file (`/proc/.../ns/net`)
#[derive(Debug)]
pub struct NetnsHandle {
    file: File,
    path: String,
}

impl NetnsHandle {
    fn open(path: String) -> NetworkResult<Self> {
        let file = File::open(&path)
            .map_err(|e| NetworkError::Namespace(format!("failed to open {}: {}", path, e)))?;
        Ok(Self { file, path })
    }
}

/// Namespace operations against the real kernel
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelNetns;

impl NetnsOps for KernelNetns {
    type Handle = NetnsHandle;
    type Links = NetlinkHandle;

    fn current(&self) -> NetworkResult<NetnsHandle> {
        // /proc/self/ns/net would name the thread group leader's namespace
        NetnsHandle::open("/proc/thread-self/ns/net".to_string())
    }

    fn from_pid(&self, pid: u32) -> NetworkResult<NetnsHandle> {
        NetnsHandle::open(format!("/proc/{}/ns/net", pid))
    }

    fn enter(&self, ns: &NetnsHandle) -> NetworkResult<()> {
        setns(&ns.file, CloneFlags::CLONE_NEWNET).map_err(|e| {
            NetworkError::Namespace(format!("setns into {} failed: {}", ns.path, e))
        })
    }

    fn connect(&self) -> NetworkResult<NetlinkHandle> {
        NetlinkHandle::new()
    }
}

/// Holds the calling thread inside a foreign namespace and switches it back
/// to the original one when dropped, on every exit path.
///
/// If the switch back fails the thread is stranded in the container's
/// namespace while the rest of the process assumes the host one. Serving
/// further requests from that state is unsafe, so the process aborts.
pub struct NetnsGuard<'a, N: NetnsOps> {
    netns: &'a N,
    original: &'a N::Handle,
}

impl<'a, N: NetnsOps> NetnsGuard<'a, N> {
    /// Switch into `target`. On error the thread never left `original` and
    /// no guard is returned.
    pub fn enter(netns: &'a N, original: &'a N::Handle, target: &N::Handle) -> NetworkResult<Self> {
        netns.enter(target)?;
        Ok(Self { netns, original })
    }
}

impl<N: NetnsOps> Drop for NetnsGuard<'_, N> {
    fn drop(&mut self) {
        if let Err(e) = self.netns.enter(self.original) {
            tracing::error!(
                "Failed to restore original network namespace, thread is stranded: {}",
                e
            );
            std::process::abort();
        }
    }
}
