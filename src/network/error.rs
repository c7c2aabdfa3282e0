/// Network-specific error type for link and namespace operations
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Netlink request rejected by the kernel
    #[error("netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),

    /// System I/O error (netlink socket, /proc namespace files)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Link not present in the namespace that was queried
    #[error("not found: {0}")]
    NotFound(String),

    /// Link exists but is some other kind than a bridge
    #[error("link {0} is not a bridge")]
    NotABridge(String),

    /// Opening or switching a network namespace failed
    #[error("namespace error: {0}")]
    Namespace(String),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
