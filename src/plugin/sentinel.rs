// Placeholder block device handed to every container as the host side of
// its DeviceSpec. Kubelet needs some real device node to bind-mount; the
// container path is what carries the information.

use crate::plugin::{PluginError, PluginResult};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use std::io::ErrorKind;
use std::path::Path;

const SENTINEL_MAJOR: u64 = 1;
const SENTINEL_MINOR: u64 = 1;

/// Create the sentinel block device at `path` unless something is already
/// there.
pub fn ensure_sentinel(path: &Path) -> PluginResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {
            tracing::debug!("Sentinel device {} already exists", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            mknod(
                path,
                SFlag::S_IFBLK,
                Mode::from_bits_truncate(0o644),
                makedev(SENTINEL_MAJOR, SENTINEL_MINOR),
            )
            .map_err(|e| {
                PluginError::Sentinel(format!("mknod {} failed: {}", path.display(), e))
            })?;
            tracing::info!("Created sentinel device {}", path.display());
            Ok(())
        }
        Err(e) => Err(PluginError::Io(e)),
    }
}
