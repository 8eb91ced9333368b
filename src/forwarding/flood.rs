//! Flooding within the ingress OpenFlow domain
//!
//! Every switch in the domain gets one packet-out per egress VLAN, sent to
//! its host-facing ports plus the link ports on the broadcast tree of the
//! source's attachment point.

use super::compiler::rewrite_for_replication;
use super::{Forwarding, PacketContext, PortGroups, RoutingDecision};
use crate::openflow::{port, PacketIn};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::EthernetPacket;
use crate::protocol::EtherType;
use crate::services::SwitchPort;
use tracing::{debug, trace, warn};

impl Forwarding {
    pub(crate) fn do_flood(
        &self,
        packet_in: &PacketIn,
        decision: &RoutingDecision,
        ctx: &PacketContext,
    ) {
        let (Some(src_device), Some(pin)) = (decision.source_device.as_deref(), decision.source_port)
        else {
            return;
        };
        let eth = match EthernetPacket::parse(&packet_in.data) {
            Ok(eth) => eth,
            Err(e) => {
                warn!("Cannot flood undecodable packet from {}: {}", pin, e);
                return;
            }
        };
        let topology = &self.services.topology;
        let tunnels = &self.services.tunnels;

        let mut tunnel_enabled = !tunnels.is_tunnel_endpoint(src_device);
        if eth.ethertype == EtherType::Arp as u16 {
            // ARP for a tunnel address stays off the tunnel topology
            if let Ok(arp) = ArpPacket::parse(&eth.payload) {
                if tunnels.switch_for_tunnel_ip(arp.target_ip).is_some() {
                    tunnel_enabled = false;
                }
            }
        }

        if !topology.is_incoming_broadcast_allowed(pin, tunnel_enabled) {
            debug!("Incoming broadcast not allowed on {}, not flooding", pin);
            return;
        }
        if self.in_switch_broadcast_cache(pin.switch, packet_in) {
            trace!("Duplicate broadcast from {} suppressed", pin);
            self.metrics.floods_suppressed.inc();
            return;
        }

        let pin_island = topology.l2_domain_id(pin.switch, tunnel_enabled);
        let Some(src_ap) = src_device
            .attachment_points
            .iter()
            .copied()
            .find(|ap| topology.l2_domain_id(ap.switch, tunnel_enabled) == pin_island)
        else {
            debug!("No attachment point for {} in the island of {}", src_device, pin);
            return;
        };
        if !topology.is_consistent(src_ap, pin, tunnel_enabled) {
            debug!(
                "Packet-in {} is inconsistent with attachment point {}, not flooding",
                pin, src_ap
            );
            return;
        }

        let address_space = src_device.address_space();
        let orig_vlan = eth.vlan_id();

        for dpid in topology.switches_in_openflow_domain(pin.switch, tunnel_enabled) {
            let Some(sw) = self.services.switches.switch(dpid) else {
                continue;
            };

            let mut ports = topology.ports(dpid);
            for p in topology.ports_with_links(dpid) {
                ports.remove(&p);
            }
            ports.extend(topology.broadcast_ports(dpid, src_ap, tunnel_enabled));
            if let Some(tunnel_port) = tunnels.tunnel_port_number(dpid) {
                ports.remove(&tunnel_port);
            }
            if dpid == pin.switch {
                ports.remove(&pin.port);
            }
            if ports.is_empty() {
                continue;
            }

            let mut groups = PortGroups::new();
            for p in ports {
                let swp = SwitchPort::new(dpid, p);
                match self.services.rewrite.switch_port_vlan_mode(
                    swp,
                    address_space,
                    orig_vlan,
                    tunnel_enabled,
                ) {
                    Some(vlan) => {
                        groups.add(dpid, vlan, p);
                    }
                    None => debug!(
                        "Not flooding to {}: no VLAN for address space {} (transport_vlan {:?})",
                        swp, address_space, ctx.rewrite.transport_vlan
                    ),
                }
            }
            let Some(vlan_groups) = groups.groups(dpid) else {
                continue;
            };

            let mut packet = eth.clone();
            if !rewrite_for_replication(&mut packet, ctx) {
                debug!("Dropping flood from {}: TTL expired", pin);
                return;
            }
            let in_port = if dpid == pin.switch {
                packet_in.in_port
            } else {
                port::NONE
            };
            for (vlan, out_ports) in vlan_groups {
                packet.set_vlan_id(*vlan);
                self.packet_out_multi_port(&packet, sw.as_ref(), in_port, out_ports.iter().copied());
            }
        }
    }
}
