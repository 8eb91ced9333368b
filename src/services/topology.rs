//! Topology queries used for island matching and replication

use super::SwitchPort;
use crate::openflow::{DatapathId, PortNo};
use std::collections::BTreeSet;

/// Cluster, island and broadcast-domain classification.
///
/// `tunnel_enabled` selects the topology instance that includes tunnel
/// links; flows touching a tunnel endpoint are classified without them.
pub trait Topology: Send + Sync {
    /// L2 island containing `switch`
    fn l2_domain_id(&self, switch: DatapathId, tunnel_enabled: bool) -> u64;

    /// OpenFlow cluster containing `switch`
    fn openflow_domain_id(&self, switch: DatapathId, tunnel_enabled: bool) -> u64;

    fn in_same_l2_domain(&self, a: DatapathId, b: DatapathId) -> bool;

    /// Port facing hosts rather than another OpenFlow switch
    fn is_attachment_point_port(&self, swp: SwitchPort, tunnel_enabled: bool) -> bool;

    /// Port facing a non-OpenFlow broadcast domain
    fn is_broadcast_domain_port(&self, swp: SwitchPort, tunnel_enabled: bool) -> bool;

    fn is_incoming_broadcast_allowed(&self, swp: SwitchPort, tunnel_enabled: bool) -> bool;

    /// A packet-in at `new` is consistent with a device attached at `old`
    fn is_consistent(&self, old: SwitchPort, new: SwitchPort, tunnel_enabled: bool) -> bool;

    fn is_in_same_broadcast_domain(
        &self,
        a: SwitchPort,
        b: SwitchPort,
        tunnel_enabled: bool,
    ) -> bool;

    /// Ingress port to use for traffic from `src` to `dst`
    fn incoming_switch_port(
        &self,
        src: SwitchPort,
        dst: SwitchPort,
        tunnel_enabled: bool,
    ) -> Option<SwitchPort>;

    /// Egress port to use for traffic from `src` to `dst`
    fn outgoing_switch_port(
        &self,
        src: SwitchPort,
        dst: SwitchPort,
        tunnel_enabled: bool,
    ) -> Option<SwitchPort>;

    fn allowed_incoming_broadcast_port(
        &self,
        swp: SwitchPort,
        tunnel_enabled: bool,
    ) -> Option<SwitchPort>;

    fn allowed_outgoing_broadcast_port(
        &self,
        src: SwitchPort,
        dst: SwitchPort,
        tunnel_enabled: bool,
    ) -> Option<SwitchPort>;

    fn switches_in_openflow_domain(
        &self,
        switch: DatapathId,
        tunnel_enabled: bool,
    ) -> BTreeSet<DatapathId>;

    /// Every enabled port on `switch`
    fn ports(&self, switch: DatapathId) -> BTreeSet<PortNo>;

    /// Ports carrying inter-switch links
    fn ports_with_links(&self, switch: DatapathId) -> BTreeSet<PortNo>;

    /// Link ports on `switch` that lie on the broadcast tree rooted at
    /// the attachment point `ap`
    fn broadcast_ports(
        &self,
        switch: DatapathId,
        ap: SwitchPort,
        tunnel_enabled: bool,
    ) -> BTreeSet<PortNo>;

    /// Traffic entering at a tunnel loopback was routed towards `dst_switch`
    fn detect_tunnel_source(&self, _first: DatapathId, _dst_switch: DatapathId) {}

    /// Traffic from the tunnel switch `src_switch` leaves via a loopback
    fn detect_tunnel_destination(&self, _src_switch: DatapathId, _last: DatapathId) {}
}
