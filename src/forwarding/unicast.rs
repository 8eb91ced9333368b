//! FORWARD and FORWARD_OR_FLOOD handling

use super::compiler::log_push_error;
use super::{
    Forwarding, PacketContext, RouteRequest, RoutingAction, RoutingDecision, APP_COOKIE,
    ROUTE_COOKIE,
};
use crate::openflow::{DatapathId, FlowModCommand, PacketIn};
use crate::services::{Device, SwitchPort};
use std::collections::BTreeMap;
use tracing::{debug, trace};

impl Forwarding {
    /// Attachment points of `device` keyed by L2 island. The first one seen
    /// in an island wins.
    pub(crate) fn islands(&self, device: &Device, tunnel_enabled: bool) -> BTreeMap<u64, SwitchPort> {
        let mut map = BTreeMap::new();
        for ap in &device.attachment_points {
            map.entry(self.services.topology.l2_domain_id(ap.switch, tunnel_enabled))
                .or_insert(*ap);
        }
        map
    }

    /// Flows touching a tunnel endpoint are classified without tunnel links
    pub(crate) fn tunnel_enabled_for(&self, src: &Device, dst: &Device) -> bool {
        let tunnels = &self.services.tunnels;
        !(tunnels.is_tunnel_endpoint(src) || tunnels.is_tunnel_endpoint(dst))
    }

    pub(crate) fn do_forward_flow(
        &self,
        packet_in: &PacketIn,
        switch: DatapathId,
        decision: &RoutingDecision,
        ctx: &PacketContext,
    ) {
        if !self.validate_decision(decision) {
            return;
        }
        let (Some(src_device), Some(pin)) = (decision.source_device.as_deref(), decision.source_port)
        else {
            return;
        };
        let topology = &self.services.topology;
        let pin_cluster = topology.l2_domain_id(pin.switch, true);

        let dst_device = match decision.first_destination() {
            Some(dst) if !dst.attachment_points.is_empty() => dst.as_ref(),
            _ => {
                self.discover(packet_in, switch, decision, ctx);
                return;
            }
        };

        let tunnel_enabled = self.tunnel_enabled_for(src_device, dst_device);

        let Some(dst_in_cluster) = dst_device
            .attachment_points
            .iter()
            .find(|ap| topology.l2_domain_id(ap.switch, true) == pin_cluster)
        else {
            debug!(
                "No attachment point for {} in the cluster of {}",
                dst_device, pin
            );
            self.discover(packet_in, switch, decision, ctx);
            return;
        };
        if *dst_in_cluster == pin {
            trace!(
                "Both source and destination are on the same switch/port {}, action NOP",
                pin
            );
            return;
        }

        let src_islands = self.islands(src_device, tunnel_enabled);
        let dst_islands = self.islands(dst_device, tunnel_enabled);
        let orig_islands = ctx
            .orig_dst_device
            .as_deref()
            .filter(|orig| self.services.tunnels.is_tunnel_endpoint(orig))
            .map(|orig| self.islands(orig, tunnel_enabled));

        for (island, src_ap) in &src_islands {
            let Some(dst_ap) = dst_islands.get(island).copied() else {
                continue;
            };
            if *src_ap == dst_ap {
                continue;
            }

            let (modified_src, route) = match &orig_islands {
                Some(orig) => {
                    let Some(orig_ap) = orig.get(island).copied() else {
                        continue;
                    };
                    let Some(modified_src) =
                        topology.incoming_switch_port(*src_ap, orig_ap, tunnel_enabled)
                    else {
                        debug!(
                            "No incoming port from {} towards {} in island {:#x}",
                            src_ap, orig_ap, island
                        );
                        continue;
                    };
                    (modified_src, self.route_in_cluster(modified_src, dst_ap))
                }
                None => {
                    let ports = (
                        topology.incoming_switch_port(*src_ap, dst_ap, tunnel_enabled),
                        topology.outgoing_switch_port(*src_ap, dst_ap, tunnel_enabled),
                    );
                    let (Some(modified_src), Some(modified_dst)) = ports else {
                        debug!(
                            "No incoming/outgoing ports between {} and {} in island {:#x}",
                            src_ap, dst_ap, island
                        );
                        continue;
                    };
                    let route = self.services.routing.route(
                        modified_src,
                        modified_dst,
                        ROUTE_COOKIE,
                        tunnel_enabled,
                    );
                    (modified_src, route)
                }
            };

            let Some(route) = route else {
                trace!("No route from {} to {} in island {:#x}", src_ap, dst_ap, island);
                continue;
            };

            if topology.is_attachment_point_port(pin, tunnel_enabled) && !route.contains(&pin) {
                // The packet came in where the route does not start; discover
                // from the port the route expects instead.
                debug!(
                    "Packet-in port {} is not on route {}, injecting ARP probes",
                    pin, route
                );
                self.inject_fake_arp_on_unicast_port(packet_in, modified_src, ctx, true);
                self.inject_fake_arp_on_broadcast_port(packet_in, switch, ctx, true);
                continue;
            }

            let req = RouteRequest {
                route: &route,
                src_device,
                of_match: None,
                packet_in: Some(packet_in),
                pin_switch: pin.switch,
                cookie: APP_COOKIE,
                wildcards: decision.wildcards,
                request_flow_removed: true,
                flush: false,
                command: FlowModCommand::Add,
                tunnel_enabled,
            };
            if let Err(e) = self.push_rewrite_route(&req, ctx) {
                log_push_error(&e);
            }
        }
    }

    /// Unknown destination: flood it, or probe for it
    fn discover(
        &self,
        packet_in: &PacketIn,
        switch: DatapathId,
        decision: &RoutingDecision,
        ctx: &PacketContext,
    ) {
        match decision.action {
            RoutingAction::ForwardOrFlood { .. } => self.do_flood(packet_in, decision, ctx),
            _ => {
                self.inject_fake_arp_on_broadcast_port(packet_in, switch, ctx, false);
            }
        }
    }
}

