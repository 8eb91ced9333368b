//! MULTICAST replication to explicit interfaces and devices

use super::compiler::rewrite_for_replication;
use super::{Forwarding, PacketContext, PortGroups, RoutingAction, RoutingDecision};
use crate::openflow::{port, PacketIn};
use crate::protocol::ethernet::EthernetPacket;
use tracing::{debug, trace, warn};

const DEFAULT_ADDRESS_SPACE: &str = "default";

impl Forwarding {
    pub(crate) fn do_multicast(
        &self,
        packet_in: &PacketIn,
        decision: &RoutingDecision,
        ctx: &PacketContext,
    ) {
        if !self.validate_decision(decision) {
            return;
        }
        let Some(pin) = decision.source_port else {
            return;
        };
        let RoutingAction::Multicast {
            devices,
            interfaces,
        } = &decision.action
        else {
            return;
        };

        let tunnel_enabled = decision
            .source_device
            .as_deref()
            .map(|src| !self.services.tunnels.is_tunnel_endpoint(src))
            .unwrap_or(true);

        let eth = match EthernetPacket::parse(&packet_in.data) {
            Ok(eth) => eth,
            Err(e) => {
                warn!("Cannot replicate undecodable packet from {}: {}", pin, e);
                return;
            }
        };
        if eth.is_truncated_ipv4() {
            debug!("Truncated IPv4 packet from {}, not replicating", pin);
            self.metrics.truncated_packets_seen.inc();
            return;
        }

        let topology = &self.services.topology;
        let cluster = topology.openflow_domain_id(pin.switch, tunnel_enabled);
        if !topology.is_incoming_broadcast_allowed(pin, tunnel_enabled) {
            debug!("Incoming broadcast not allowed on {}, not replicating", pin);
            return;
        }

        let address_space = decision
            .source_device
            .as_deref()
            .map(|src| src.address_space())
            .unwrap_or(DEFAULT_ADDRESS_SPACE);
        let orig_vlan = eth.vlan_id();
        let rewrite = &self.services.rewrite;
        let mut groups = PortGroups::new();

        for swt in interfaces {
            let Some(out) = topology.outgoing_switch_port(pin, *swt, tunnel_enabled) else {
                trace!("No outgoing port from {} towards interface {}", pin, swt);
                continue;
            };
            if topology.openflow_domain_id(out.switch, tunnel_enabled) != cluster || out == pin {
                continue;
            }
            let Some(vlan) = rewrite.switch_port_vlan_mode(out, address_space, orig_vlan, tunnel_enabled)
            else {
                debug!(
                    "Not replicating to interface {}: no VLAN for address space {}",
                    out, address_space
                );
                continue;
            };
            groups.add(out.switch, vlan, out.port);
        }

        for device in devices {
            for ap in &device.attachment_points {
                if !topology.in_same_l2_domain(ap.switch, pin.switch) {
                    continue;
                }
                let Some(out) = topology.allowed_outgoing_broadcast_port(pin, *ap, tunnel_enabled)
                else {
                    continue;
                };
                if topology.is_in_same_broadcast_domain(pin, out, tunnel_enabled) {
                    continue;
                }
                if self.services.switches.switch(out.switch).is_none() {
                    continue;
                }
                let Some(vlan) =
                    rewrite.switch_port_vlan_mode(*ap, address_space, orig_vlan, tunnel_enabled)
                else {
                    debug!(
                        "Not replicating to {}: no VLAN for address space {}",
                        device, address_space
                    );
                    continue;
                };
                groups.add(out.switch, vlan, out.port);
            }
        }

        let mut packet = eth;
        if !rewrite_for_replication(&mut packet, ctx) {
            debug!("Dropping multicast from {}: TTL expired", pin);
            return;
        }

        for (dpid, vlan_groups) in groups.iter() {
            let Some(sw) = self.services.switches.switch(dpid) else {
                continue;
            };
            for (vlan, out_ports) in vlan_groups {
                packet.set_vlan_id(*vlan);
                self.packet_out_multi_port(&packet, sw.as_ref(), port::NONE, out_ports.iter().copied());
            }
        }
    }
}
