//! Kernel event listener: discovers network interfaces.
//!
//! Discovery has two sources feeding the same inventory:
//!
//! - a one-shot enumeration of existing link-layer interfaces at startup
//!   ([`LinkEnumerator`], `getifaddrs` on Linux), and
//! - a live stream of `RTM_NEWLINK` notifications from a `NETLINK_ROUTE`
//!   socket subscribed to `RTMGRP_LINK` ([`LinkEventSource`]).
//!
//! The socket is bound before enumerating so no creation falls between the
//! two. Enumeration results are recorded before the receive thread starts;
//! a live event for an interface already seen is a no-op. Link deletion is
//! not observed.

use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{OsmgrError, Result};
use crate::inventory::Inventory;

#[cfg(target_os = "linux")]
pub use linux::{parse_link_messages, IfAddrsEnumerator, LinkEventListener};
#[cfg(not(target_os = "linux"))]
pub use stub::{IfAddrsEnumerator, LinkEventListener};

/// Name of the dedicated receive thread.
pub const LISTENER_THREAD_NAME: &str = "osmgr-netlink";

/// A link notification decoded from the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkNotification {
    /// A link was created (or changed) and carries a name
    Created { ifname: String },
    /// `RTM_NEWLINK` without an `IFLA_IFNAME` attribute
    Unnamed,
}

/// Blocking source of link notifications.
pub trait LinkEventSource: Send {
    /// Waits for the next batch of notifications.
    ///
    /// Returns `Ok(None)` once the source is closed.
    fn recv_batch(&mut self) -> Result<Option<Vec<LinkNotification>>>;
}

/// One-shot enumeration of existing link-layer interfaces.
#[cfg_attr(test, mockall::automock)]
pub trait LinkEnumerator {
    fn link_names(&self) -> Result<Vec<String>>;
}

/// Records every named notification in the inventory.
///
/// Returns how many interfaces were new.
pub fn record_discoveries(inventory: &Inventory, notifications: &[LinkNotification]) -> usize {
    let mut added = 0;
    for notification in notifications {
        match notification {
            LinkNotification::Created { ifname } => {
                if inventory.record(ifname) {
                    info!(ifname = %ifname, "Discovered interface");
                    added += 1;
                }
            }
            LinkNotification::Unnamed => {
                warn!("Link notification without interface name, dropped");
            }
        }
    }
    added
}

/// Receives notifications into the inventory until the source closes or fails.
pub fn run_listener<S>(source: &mut S, inventory: &Inventory) -> Result<()>
where
    S: LinkEventSource + ?Sized,
{
    while let Some(batch) = source.recv_batch()? {
        let added = record_discoveries(inventory, &batch);
        debug!(received = batch.len(), added, "Processed link notifications");
    }
    Ok(())
}

/// Starts the receive loop on its own OS thread.
///
/// The loop only ends on error or when the source closes; either way the
/// reason is delivered once on the returned channel.
pub fn spawn_listener<S>(
    mut source: S,
    inventory: Inventory,
) -> Result<oneshot::Receiver<OsmgrError>>
where
    S: LinkEventSource + 'static,
{
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name(LISTENER_THREAD_NAME.to_string())
        .spawn(move || {
            info!("Listening for kernel link events");
            let reason = match run_listener(&mut source, &inventory) {
                Ok(()) => OsmgrError::Netlink("kernel event source closed".to_string()),
                Err(e) => e,
            };
            error!(error = %reason, "Kernel event listener stopped");
            let _ = tx.send(reason);
        })?;

    Ok(rx)
}

#[cfg(target_os = "linux")]
mod linux {
    use std::io;

    use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
    use netlink_packet_route::link::{LinkAttribute, LinkMessage};
    use netlink_packet_route::RouteNetlinkMessage;
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use nix::ifaddrs::getifaddrs;
    use nix::sys::socket::{AddressFamily, SockaddrLike};
    use tracing::{debug, trace, warn};

    use super::{LinkEnumerator, LinkEventSource, LinkNotification};
    use crate::error::{OsmgrError, Result};

    /// Multicast group for link notifications (RTMGRP_LINK)
    const RTMGRP_LINK: u32 = 1;

    /// Netlink message header length (NLMSG_HDRLEN)
    const NLMSG_HDRLEN: usize = 16;

    /// `NETLINK_ROUTE` socket subscribed to link notifications.
    pub struct LinkEventListener {
        socket: Socket,
        buffer: Vec<u8>,
    }

    impl LinkEventListener {
        /// Opens and binds the socket. Fails if the kernel refuses either step.
        pub fn bind(buffer_size: usize) -> Result<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| OsmgrError::Netlink(format!("Failed to create socket: {}", e)))?;

            socket
                .bind(&SocketAddr::new(0, RTMGRP_LINK))
                .map_err(|e| OsmgrError::Netlink(format!("Failed to bind socket: {}", e)))?;

            debug!(buffer_size, "Netlink socket bound to RTMGRP_LINK");
            Ok(Self {
                socket,
                buffer: Vec::with_capacity(buffer_size),
            })
        }
    }

    impl LinkEventSource for LinkEventListener {
        fn recv_batch(&mut self) -> Result<Option<Vec<LinkNotification>>> {
            loop {
                self.buffer.clear();
                match self.socket.recv(&mut self.buffer, 0) {
                    Ok(len) => return Ok(Some(parse_link_messages(&self.buffer[..len]))),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Err(OsmgrError::Netlink(format!("Failed to receive: {}", e)));
                    }
                }
            }
        }
    }

    impl std::fmt::Debug for LinkEventListener {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LinkEventListener")
                .field("buffer_size", &self.buffer.capacity())
                .finish()
        }
    }

    /// Decodes every netlink message in one receive buffer.
    ///
    /// Stops at `NLMSG_DONE` or at a truncated message. Messages that fail
    /// to decode are skipped; non-link messages are ignored.
    pub fn parse_link_messages(buf: &[u8]) -> Vec<LinkNotification> {
        let mut notifications = Vec::new();
        let mut offset = 0;

        while offset + NLMSG_HDRLEN <= buf.len() {
            let rest = &buf[offset..];
            let length = u32::from_ne_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if length < NLMSG_HDRLEN || length > rest.len() {
                warn!(offset, length, available = rest.len(), "Truncated netlink message");
                break;
            }

            match NetlinkMessage::<RouteNetlinkMessage>::deserialize(&rest[..length]) {
                Ok(msg) => match msg.payload {
                    NetlinkPayload::Done(_) => break,
                    NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link)) => {
                        notifications.push(link_notification(link));
                    }
                    other => trace!(message = ?other, "Ignoring netlink message"),
                },
                Err(e) => warn!(error = %e, "Failed to decode netlink message"),
            }

            // Align to 4 bytes
            offset += (length + 3) & !3;
        }

        notifications
    }

    fn link_notification(link: LinkMessage) -> LinkNotification {
        link.attributes
            .into_iter()
            .find_map(|attr| match attr {
                LinkAttribute::IfName(ifname) => Some(LinkNotification::Created { ifname }),
                _ => None,
            })
            .unwrap_or(LinkNotification::Unnamed)
    }

    /// Enumerates interfaces with `getifaddrs`, keeping `AF_PACKET` entries.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct IfAddrsEnumerator;

    impl LinkEnumerator for IfAddrsEnumerator {
        fn link_names(&self) -> Result<Vec<String>> {
            let addrs = getifaddrs()
                .map_err(|e| OsmgrError::Enumerate(format!("getifaddrs failed: {}", e)))?;

            let mut names = Vec::new();
            for ifaddr in addrs {
                let family = ifaddr.address.as_ref().and_then(|addr| addr.family());
                debug!(
                    ifname = %ifaddr.interface_name,
                    family = ?family,
                    "Existing interface address"
                );
                if family == Some(AddressFamily::Packet) {
                    names.push(ifaddr.interface_name);
                }
            }
            Ok(names)
        }
    }

}

#[cfg(not(target_os = "linux"))]
mod stub {
    use super::{LinkEnumerator, LinkEventSource, LinkNotification};
    use crate::error::{OsmgrError, Result};

    /// Placeholder; netlink is only available on Linux.
    #[derive(Debug)]
    pub struct LinkEventListener {
        _private: (),
    }

    impl LinkEventListener {
        pub fn bind(_buffer_size: usize) -> Result<Self> {
            Err(OsmgrError::Netlink(
                "netlink is not available on this platform".to_string(),
            ))
        }
    }

    impl LinkEventSource for LinkEventListener {
        fn recv_batch(&mut self) -> Result<Option<Vec<LinkNotification>>> {
            Ok(None)
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct IfAddrsEnumerator;

    impl LinkEnumerator for IfAddrsEnumerator {
        fn link_names(&self) -> Result<Vec<String>> {
            Err(OsmgrError::Enumerate(
                "link enumeration is not available on this platform".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct ScriptedSource {
        batches: VecDeque<Result<Vec<LinkNotification>>>,
    }

    impl LinkEventSource for ScriptedSource {
        fn recv_batch(&mut self) -> Result<Option<Vec<LinkNotification>>> {
            self.batches.pop_front().transpose()
        }
    }

    fn created(ifname: &str) -> LinkNotification {
        LinkNotification::Created {
            ifname: ifname.to_string(),
        }
    }

    #[test]
    fn test_record_discoveries_is_idempotent() {
        let inventory = Inventory::new();
        let batch = vec![created("eth0"), LinkNotification::Unnamed, created("eth0")];

        assert_eq!(record_discoveries(&inventory, &batch), 1);
        assert_eq!(record_discoveries(&inventory, &batch), 0);
        assert_eq!(inventory.names(), vec!["eth0".to_string()]);
    }

    #[test]
    fn test_run_listener_until_closed() {
        let inventory = Inventory::new();
        let mut source = ScriptedSource {
            batches: VecDeque::from(vec![Ok(vec![created("eth0")]), Ok(vec![created("eth1")])]),
        };

        assert!(run_listener(&mut source, &inventory).is_ok());
        assert!(inventory.exists("eth0"));
        assert!(inventory.exists("eth1"));
    }

    #[test]
    fn test_run_listener_stops_on_error() {
        let inventory = Inventory::new();
        let mut source = ScriptedSource {
            batches: VecDeque::from(vec![
                Err(OsmgrError::Netlink("recv failed".to_string())),
                Ok(vec![created("eth0")]),
            ]),
        };

        assert!(run_listener(&mut source, &inventory).is_err());
        assert!(!inventory.exists("eth0"));
    }

    #[tokio::test]
    async fn test_spawn_listener_reports_stop() {
        let inventory = Inventory::new();
        let source = ScriptedSource {
            batches: VecDeque::from(vec![Ok(vec![created("eth3")])]),
        };

        let stopped = spawn_listener(source, inventory.clone()).unwrap();
        let reason = stopped.await.unwrap();

        assert!(reason.is_fatal());
        assert!(inventory.exists("eth3"));
    }

    #[test]
    fn test_mock_enumerator() {
        let mut enumerator = MockLinkEnumerator::new();
        enumerator
            .expect_link_names()
            .returning(|| Ok(vec!["lo".to_string()]));
        assert_eq!(enumerator.link_names().unwrap(), vec!["lo".to_string()]);
    }
}
