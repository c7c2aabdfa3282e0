//! Constants for the bridge device plugin
//!
//! Timing cadences, naming bounds and filesystem locations live here so the
//! rest of the code never carries magic numbers.

use std::time::Duration;

// ============================================================================
// Device Pool
// ============================================================================

/// Number of virtual NIC slots advertised per bridge.
pub const NICS_POOL_SIZE: usize = 100;

/// Resource namespace prefixed to the bridge name, e.g.
/// `bridge.network.kubevirt.io/br0`.
pub const RESOURCE_NAMESPACE: &str = "bridge.network.kubevirt.io";

/// Protocol reported for every interface handed to a container.
pub const PROTOCOL_ETHERNET: &str = "Ethernet";

// ============================================================================
// Timing
// ============================================================================

/// How often ListAndWatch re-checks bridge existence.
pub const BRIDGE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long the assignment pipeline sleeps when no new work arrived.
pub const ASSIGNMENT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Pending assignments older than this are dropped without attachment.
pub const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Capacity of the Allocate -> pipeline queue. Allocate waits for space
/// once it is full.
pub const ASSIGNMENT_QUEUE_CAPACITY: usize = 1024;

// ============================================================================
// Naming
// ============================================================================

/// Kernel limit for interface names (IFNAMSIZ minus the trailing NUL).
pub const INTERFACE_NAME_LEN: usize = 15;

/// Prefix of the host side of every veth pair we create.
pub const INTERFACE_NAME_PREFIX: &str = "nic_";

/// Alphabet used for random name suffixes.
pub const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Environment variable carrying the interface descriptor for a container.
pub const ENV_VAR_NAME_PREFIX: &str = "NETWORK_INTERFACE_RESOURCES_";

/// Length of the random, upper-cased env var name suffix.
pub const ENV_VAR_NAME_SUFFIX_LEN: usize = 8;

// ============================================================================
// Paths
// ============================================================================

/// Placeholder block device mounted into every allocated container.
pub const FAKE_DEVICE_PATH: &str = "/var/run/device-plugin-network-bridge-fakedev";

/// Root of the per-device correlation paths inside containers.
pub const ASSIGNMENT_PATH_ROOT: &str = "/tmp/device-plugin-network-bridge";

/// Directory where kubelet expects device plugin sockets.
pub const DEVICE_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins";

/// Kubelet registration socket name inside [`DEVICE_PLUGIN_DIR`].
pub const KUBELET_SOCKET: &str = "kubelet.sock";

/// Device plugin API version we register with.
pub const DEVICE_PLUGIN_API_VERSION: &str = "v1beta1";

/// Health values understood by kubelet.
pub const HEALTHY: &str = "Healthy";
