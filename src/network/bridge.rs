// Bridge existence checks against the kernel link table

use crate::network::LinkOps;

/// True only if a link called `name` exists and is a bridge.
///
/// Any lookup error counts as "absent"; nothing is propagated and nothing is
/// retried.
pub async fn bridge_exists<L: LinkOps + ?Sized>(links: &L, name: &str) -> bool {
    match links.link_by_name(name).await {
        Ok(link) => {
            if !link.is_bridge() {
                tracing::debug!(
                    "Link {} exists but is {:?}, not a bridge",
                    name,
                    link.kind
                );
            }
            link.is_bridge()
        }
        Err(e) => {
            tracing::debug!("Bridge {} lookup failed: {}", name, e);
            false
        }
    }
}
