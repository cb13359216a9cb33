//! BACnet network-layer router (Clause 6): multi-port routing with
//! split-horizon advertisement and a hop-count floor.
//!
//! A [`Router`] owns no sockets; it is driven by whatever code reads NPDUs
//! off a [`crate::datalink::DataLink`] and decides what to do with each one,
//! the same poll-driven shape as [`crate::tsm::Tsm`]. Feeding it an inbound
//! NPDU plus the local port it arrived on returns zero or more
//! [`RouterAction`]s telling the caller what to transmit and where.
//!
//! Split-horizon: a router never advertises reachability to a network over
//! the same port that network is attached to — see
//! [`Router::handle_who_is_router_to_network`].

use std::time::{Duration, Instant};

use super::{NetworkAddress, NetworkLayerMessage, NetworkMessageType, Npdu, NpduControl};

/// A locally attached network: a port id (meaningful only to the caller,
/// who maps it back to a [`crate::datalink::DataLink`]) and the BACnet
/// network number reachable directly through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPort {
    pub port_id: u32,
    pub network: u16,
}

/// A learned or configured route to a remote network.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub network: u16,
    pub port_id: u32,
    pub next_hop: NetworkAddress,
    pub reachable: bool,
    pub last_seen: Instant,
}

/// A broadcast NPDU queued while we wait to learn a route for its
/// destination network. Retried exactly once; dropped (and logged) if
/// still unreachable after the retry.
struct PendingBroadcast {
    network: u16,
    npdu: Npdu,
    queued_at: Instant,
    retried: bool,
}

/// How long to wait for an I-Am-Router-To-Network reply before retrying
/// (and, on a second miss, giving up).
const ROUTE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// What the caller should transmit as a result of feeding the router an
/// inbound NPDU, and where.
///
/// `Forward` carries only the (re-encoded, hop-decremented) NPDU header —
/// the caller already holds the original APDU payload bytes and appends
/// them unchanged, the same split `Npdu::decode`'s callers already use
/// elsewhere in this crate. `Broadcast` carries a router-generated
/// network-layer message in full, since there is no pre-existing payload
/// to reuse.
#[derive(Debug, Clone)]
pub enum RouterAction {
    /// Hand the NPDU up to the local application layer.
    DeliverLocally { npdu: Npdu },
    /// Send `npdu`'s header out `port_id` toward `next_hop`, followed by
    /// the original APDU payload.
    Forward { port_id: u32, next_hop: NetworkAddress, npdu: Npdu },
    /// Send `npdu`'s header out `port_id` followed by `message` (a network
    /// layer message query or reply).
    Broadcast { port_id: u32, npdu: Npdu, message: Vec<u8> },
}

/// Router core: routing table with reachability/last-seen state,
/// split-horizon router discovery, and hop-count enforcement.
pub struct Router {
    local_ports: Vec<LocalPort>,
    routes: Vec<RouteEntry>,
    pending: Vec<PendingBroadcast>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            local_ports: Vec::new(),
            routes: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn add_local_port(&mut self, port_id: u32, network: u16) {
        self.local_ports.push(LocalPort { port_id, network });
    }

    fn local_port_for_network(&self, network: u16) -> Option<&LocalPort> {
        self.local_ports.iter().find(|p| p.network == network)
    }

    fn local_port_of(&self, port_id: u32) -> Option<&LocalPort> {
        self.local_ports.iter().find(|p| p.port_id == port_id)
    }

    pub fn find_route(&self, network: u16) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.network == network && r.reachable)
    }

    /// Record or refresh a route learned from an I-Am-Router-To-Network
    /// (or a configured static route).
    pub fn learn_route(&mut self, network: u16, port_id: u32, next_hop: NetworkAddress) {
        if let Some(existing) = self.routes.iter_mut().find(|r| r.network == network) {
            existing.port_id = port_id;
            existing.next_hop = next_hop;
            existing.reachable = true;
            existing.last_seen = Instant::now();
        } else {
            self.routes.push(RouteEntry {
                network,
                port_id,
                next_hop,
                reachable: true,
                last_seen: Instant::now(),
            });
        }
        log::debug!("learned route to network {} via port {}", network, port_id);
    }

    pub fn mark_unreachable(&mut self, network: u16) {
        if let Some(route) = self.routes.iter_mut().find(|r| r.network == network) {
            route.reachable = false;
            log::debug!("network {} marked unreachable", network);
        }
    }

    /// Feed an inbound application-layer NPDU (`is_network_message() ==
    /// false`) that arrived on `arrival_port`. Returns every action the
    /// caller should take — usually zero or one, but a
    /// Who-Is-Router-To-Network broadcast query can fan out to several
    /// ports.
    ///
    /// Network-layer messages (Who-Is/I-Am-Router-To-Network) carry their
    /// payload where `Npdu` has no field for it, so decode those with
    /// [`NetworkLayerMessage::decode`] and dispatch directly to
    /// [`Router::handle_who_is_router_to_network`] /
    /// [`Router::handle_i_am_router_to_network`] instead of through here.
    pub fn route_npdu(&mut self, npdu: Npdu, arrival_port: u32) -> Vec<RouterAction> {
        let destination = match &npdu.destination {
            None => return vec![RouterAction::DeliverLocally { npdu }],
            Some(dest) => dest.clone(),
        };

        if destination.is_local() {
            return vec![RouterAction::DeliverLocally { npdu }];
        }

        if let Some(port) = self.local_port_for_network(destination.network) {
            if port.port_id == arrival_port {
                // Destination network is the one it arrived on; nothing to do.
                return Vec::new();
            }
            return vec![RouterAction::Forward {
                port_id: port.port_id,
                next_hop: destination,
                npdu,
            }];
        }

        match self.decrement_hop_count(npdu) {
            None => {
                log::warn!("discarding NPDU to network {}: hop count exhausted", destination.network);
                Vec::new()
            }
            Some(npdu) => {
                if let Some(route) = self.find_route(destination.network).cloned() {
                    vec![RouterAction::Forward {
                        port_id: route.port_id,
                        next_hop: route.next_hop,
                        npdu,
                    }]
                } else {
                    self.queue_and_discover(destination.network, npdu)
                }
            }
        }
    }

    /// Hop count starts at 255 and only ever moves toward 0; a router that
    /// receives one already at 0 discards it instead of forwarding.
    fn decrement_hop_count(&self, mut npdu: Npdu) -> Option<Npdu> {
        match npdu.hop_count {
            Some(0) => None,
            Some(n) => {
                npdu.hop_count = Some(n - 1);
                Some(npdu)
            }
            None => Some(npdu),
        }
    }

    fn queue_and_discover(&mut self, network: u16, npdu: Npdu) -> Vec<RouterAction> {
        self.pending.push(PendingBroadcast {
            network,
            npdu,
            queued_at: Instant::now(),
            retried: false,
        });
        self.broadcast_who_is_router_to_network(Some(network))
    }

    fn broadcast_who_is_router_to_network(&self, network: Option<u16>) -> Vec<RouterAction> {
        let data = match network {
            Some(n) => n.to_be_bytes().to_vec(),
            None => Vec::new(),
        };
        let message = NetworkLayerMessage::new(NetworkMessageType::WhoIsRouterToNetwork, data).encode();
        self.local_ports
            .iter()
            .map(|port| RouterAction::Broadcast {
                port_id: port.port_id,
                npdu: network_message_npdu(),
                message: message.clone(),
            })
            .collect()
    }

    /// Reply to a Who-Is-Router-To-Network query, never telling the
    /// querying port about a network it is itself attached to (split
    /// horizon — prevents two-router loops advertising each other's
    /// directly-connected network back at them).
    pub fn handle_who_is_router_to_network(
        &self,
        network: Option<u16>,
        arrival_port: u32,
    ) -> Vec<RouterAction> {
        let mut reachable: Vec<u16> = Vec::new();

        for port in &self.local_ports {
            if port.port_id != arrival_port {
                if network.is_none() || network == Some(port.network) {
                    reachable.push(port.network);
                }
            }
        }
        for route in &self.routes {
            if !route.reachable || route.port_id == arrival_port {
                continue;
            }
            if network.is_none() || network == Some(route.network) {
                reachable.push(route.network);
            }
        }

        reachable
            .into_iter()
            .map(|net| {
                let message =
                    NetworkLayerMessage::new(NetworkMessageType::IAmRouterToNetwork, net.to_be_bytes().to_vec())
                        .encode();
                RouterAction::Broadcast {
                    port_id: arrival_port,
                    npdu: network_message_npdu(),
                    message,
                }
            })
            .collect()
    }

    /// Learn a route from a received I-Am-Router-To-Network, one network
    /// number per call (a single I-Am can list several; split by caller).
    pub fn handle_i_am_router_to_network(&mut self, network: u16, arrival_port: u32, source: NetworkAddress) {
        if let Some(local) = self.local_port_of(arrival_port) {
            if local.network == network {
                // A router should never advertise a route back to the
                // network it's already directly attached to.
                return;
            }
        }
        self.learn_route(network, arrival_port, source);
    }

    /// Retry (once) or drop pending broadcasts that have waited past
    /// [`ROUTE_DISCOVERY_TIMEOUT`] with no route learned. Call periodically
    /// from the same loop that polls [`crate::tsm::Tsm::poll_timeouts`].
    pub fn poll_pending(&mut self) -> Vec<RouterAction> {
        let now = Instant::now();
        let mut actions = Vec::new();
        let mut still_pending = Vec::new();

        for mut entry in self.pending.drain(..) {
            if self.find_route(entry.network).is_some() {
                continue; // Route arrived; route_npdu already forwarded nothing further — drop it silently, matches spec's single-shot retry semantics.
            }
            if now.duration_since(entry.queued_at) < ROUTE_DISCOVERY_TIMEOUT {
                still_pending.push(entry);
                continue;
            }
            if !entry.retried {
                entry.retried = true;
                entry.queued_at = now;
                actions.extend(self.broadcast_who_is_router_to_network(Some(entry.network)));
                still_pending.push(entry);
            } else {
                log::warn!("dropping NPDU to network {}: no route found after retry", entry.network);
            }
        }

        self.pending = still_pending;
        actions
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the addressing/control half of a network-layer message NPDU; the
/// accompanying [`RouterAction::Broadcast::message`] bytes are the payload.
fn network_message_npdu() -> Npdu {
    Npdu {
        version: 1,
        control: NpduControl {
            network_message: true,
            destination_present: false,
            source_present: false,
            expecting_reply: false,
            priority: 0,
        },
        destination: None,
        source: None,
        hop_count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(network: u16, mac: &[u8]) -> NetworkAddress {
        NetworkAddress::new(network, mac.to_vec())
    }

    fn dest_npdu(network: u16, hop_count: Option<u8>) -> Npdu {
        Npdu {
            version: 1,
            control: NpduControl {
                network_message: false,
                destination_present: true,
                source_present: false,
                expecting_reply: false,
                priority: 0,
            },
            destination: Some(addr(network, &[1, 2, 3, 4, 0xBA, 0xC0])),
            source: None,
            hop_count,
        }
    }

    #[test]
    fn forwards_directly_to_an_attached_network() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.add_local_port(2, 20);

        let npdu = dest_npdu(20, Some(255));
        let actions = router.route_npdu(npdu, 1);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RouterAction::Forward { port_id, .. } => assert_eq!(*port_id, 2),
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn hop_count_floors_at_zero_and_is_discarded() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.learn_route(99, 2, addr(99, &[9, 9, 9, 9, 0, 0]));

        let npdu = dest_npdu(99, Some(0));
        let actions = router.route_npdu(npdu, 1);
        assert!(actions.is_empty(), "a zero hop count must be discarded, not forwarded");
    }

    #[test]
    fn hop_count_decrements_by_one_when_forwarded() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.learn_route(99, 2, addr(99, &[9, 9, 9, 9, 0, 0]));

        let npdu = dest_npdu(99, Some(5));
        let actions = router.route_npdu(npdu, 1);
        match &actions[0] {
            RouterAction::Forward { npdu, .. } => assert_eq!(npdu.hop_count, Some(4)),
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn unknown_network_triggers_who_is_router_broadcast_and_is_queued() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.add_local_port(2, 20);

        let npdu = dest_npdu(77, Some(255));
        let actions = router.route_npdu(npdu, 1);
        assert_eq!(actions.len(), 2, "should broadcast on every local port");
        for action in &actions {
            match action {
                RouterAction::Broadcast { npdu, .. } => assert!(npdu.is_network_message()),
                other => panic!("expected Broadcast, got {:?}", other),
            }
        }
        assert_eq!(router.pending.len(), 1);
    }

    #[test]
    fn split_horizon_never_advertises_a_network_back_to_its_own_port() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.add_local_port(2, 20);

        // Query arriving on port 1 asking about network 10 (port 1's own
        // attached network) must get no reply: we'd only be telling port 1
        // about itself.
        let actions = router.handle_who_is_router_to_network(Some(10), 1);
        assert!(actions.is_empty());

        // But a query on port 1 about network 20 (reachable via port 2)
        // does get a reply.
        let actions = router.handle_who_is_router_to_network(Some(20), 1);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn split_horizon_excludes_routes_learned_via_the_querying_port() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.add_local_port(2, 20);
        router.learn_route(30, 1, addr(30, &[1, 1, 1, 1, 0, 0]));

        // Network 30 was learned via port 1; a query arriving on port 1
        // must not be told about it.
        let actions = router.handle_who_is_router_to_network(None, 1);
        assert!(actions.iter().all(|a| match a {
            RouterAction::Broadcast { .. } => true,
            _ => false,
        }));
        assert_eq!(actions.len(), 0);
    }

    #[test]
    fn i_am_router_to_network_does_not_overwrite_a_directly_attached_network() {
        let mut router = Router::new();
        router.add_local_port(1, 10);

        router.handle_i_am_router_to_network(10, 1, addr(10, &[2, 2, 2, 2, 0, 0]));
        assert!(router.find_route(10).is_none());
    }

    #[test]
    fn pending_broadcast_is_dropped_after_one_retry_with_no_route() {
        let mut router = Router::new();
        router.add_local_port(1, 10);
        router.route_npdu(dest_npdu(55, Some(255)), 1);
        assert_eq!(router.pending.len(), 1);

        router.pending[0].queued_at = Instant::now() - ROUTE_DISCOVERY_TIMEOUT - Duration::from_millis(1);
        let actions = router.poll_pending();
        assert!(!actions.is_empty(), "first timeout should retry");
        assert_eq!(router.pending.len(), 1);
        assert!(router.pending[0].retried);

        router.pending[0].queued_at = Instant::now() - ROUTE_DISCOVERY_TIMEOUT - Duration::from_millis(1);
        let actions = router.poll_pending();
        assert!(actions.is_empty(), "second timeout should drop, not retry again");
        assert!(router.pending.is_empty());
    }
}
