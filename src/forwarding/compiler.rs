//! Route-to-rule compilation
//!
//! One flow-mod per hop, built first-to-last while simulating the header
//! rewrites on a working copy of the packet, then written last-to-first so
//! downstream switches are ready before upstream ones forward into them.

use super::{wildcard, Forwarding, PacketContext, ROUTE_COOKIE};
use crate::openflow::{
    Action, DatapathId, FlowMod, FlowModCommand, OfMatch, PacketIn, PacketOut, PortNo,
    OFPFF_SEND_FLOW_REM,
};
use crate::protocol::ethernet::EthernetPacket;
use crate::protocol::{MacAddr, VLAN_UNTAGGED};
use crate::services::{Device, FlowAction, FlowCacheEntry, OfSwitch, Route, SwitchPort};
use crate::{Error, Result};
use tracing::{debug, error, info, trace, warn};

/// Everything needed to compile and install one route
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    pub route: &'a Route,
    pub src_device: &'a Device,
    /// Match to start from when there is no packet (reconciliation)
    pub of_match: Option<OfMatch>,
    pub packet_in: Option<&'a PacketIn>,
    pub pin_switch: DatapathId,
    pub cookie: u64,
    pub wildcards: Option<u32>,
    pub request_flow_removed: bool,
    pub flush: bool,
    pub command: FlowModCommand,
    pub tunnel_enabled: bool,
}

struct CompiledHop {
    switch: DatapathId,
    in_port: PortNo,
    out_port: PortNo,
    next_hop: Option<DatapathId>,
    flow_mod: FlowMod,
}

impl Forwarding {
    /// Compile `req.route` and install it.
    ///
    /// Returns whether the packet-in switch port is the ingress of one of
    /// the hops, in which case the packet was also pushed out there.
    /// An `Err` means nothing after the failing hop was written.
    pub fn push_rewrite_route(&self, req: &RouteRequest<'_>, ctx: &PacketContext) -> Result<bool> {
        let path = &req.route.path;
        if path.is_empty() {
            return Err(Error::InvalidRoute("route is empty".into()));
        }
        if path.len() % 2 != 0 {
            return Err(Error::InvalidRoute(format!(
                "odd number of ports on the route {}: {}",
                path.len(),
                req.route
            )));
        }

        let pin_port = req.packet_in.map(|pi| pi.in_port);
        let (mut eth, mut of_match, ip_addrs) = match req.packet_in {
            Some(pi) => {
                let eth = EthernetPacket::parse(&pi.data)?;
                let of_match = OfMatch::from_ethernet(&eth, pi.in_port);
                let ip_addrs = eth.ipv4_addrs();
                (eth, of_match, ip_addrs)
            }
            None => {
                let of_match = req.of_match.ok_or_else(|| {
                    Error::InvalidRoute("neither packet nor match to compile from".into())
                })?;
                let eth = EthernetPacket::header_only(
                    of_match.dl_dst,
                    of_match.dl_src,
                    of_match.dl_vlan,
                    of_match.dl_type,
                );
                (eth, of_match, None)
            }
        };

        let address_space = req.src_device.address_space();
        let first_hop_input = path[0];

        if first_hop_input.switch != req.pin_switch {
            // Rebuild the packet as the first hop sees it, addressed to the
            // original destination MAC if a rewrite is pending.
            let vlan = self.first_hop_vlan(req.src_device, first_hop_input, req.tunnel_enabled)?;
            eth.set_vlan_id(vlan);
            of_match.dl_vlan = vlan;
            if let Some(mac) = ctx.rewrite.orig_ingress_dst_mac {
                eth.dst_mac = mac;
                of_match.dl_dst = mac;
            }
        }

        let hard_timeout = ctx
            .decision
            .as_ref()
            .map(|d| d.hard_timeout)
            .unwrap_or(self.settings.hard_timeout);
        let priority = self.access_priority();

        let mut hops = Vec::with_capacity(req.route.hops());
        let mut packet_out_eth = None;
        let mut src_switch_included = false;

        for indx in (1..path.len()).step_by(2) {
            let in_swp = path[indx - 1];
            let out_swp = path[indx];
            let sw = self
                .services
                .switches
                .switch(out_swp.switch)
                .ok_or(Error::SwitchUnavailable(out_swp.switch))?;
            let attrs = sw.attributes();
            let next_hop = (indx + 2 < path.len()).then(|| path[indx + 1].switch);
            let first_or_last_hop = indx == 1 || indx + 2 > path.len();

            let hop_match = wildcard(
                of_match.with_in_port(in_swp.port),
                &attrs,
                req.wildcards,
                req.tunnel_enabled,
                first_or_last_hop,
            );

            let mut actions = Vec::new();
            let egress_vlan = self
                .services
                .rewrite
                .switch_port_vlan_mode(out_swp, address_space, eth.vlan_id(), req.tunnel_enabled)
                .ok_or(Error::PortForbidden(out_swp))?;
            actions.extend(vlan_rewrite_action(hop_match.dl_vlan, egress_vlan));
            eth.set_vlan_id(egress_vlan);
            of_match.dl_vlan = egress_vlan;

            let mut flags = 0;
            if indx == 1 {
                // Flow-removed feeds the flow cache; ARP rules are not cached.
                if req.request_flow_removed && !of_match.is_arp() {
                    flags |= OFPFF_SEND_FLOW_REM;
                }
                if let Some(mac) = ctx.rewrite.final_ingress_dst_mac {
                    actions.extend(dst_mac_rewrite_action(of_match.dl_dst, mac));
                    eth.dst_mac = mac;
                    of_match.dl_dst = mac;
                }
                if let Some(n) = ctx.rewrite.ttl_decrement.filter(|_| attrs.supports_ttl_decrement) {
                    if !eth.decrement_ttl(n) {
                        debug!(
                            "Dropping packet from {}: TTL expired or IPv4 header unreadable",
                            req.src_device
                        );
                        return Err(Error::TtlExpired);
                    }
                    actions.push(Action::DecTtl);
                }
            }

            if indx == path.len() - 1 {
                if let Some(mac) = ctx.rewrite.final_egress_src_mac {
                    actions.extend(src_mac_rewrite_action(of_match.dl_src, mac));
                    eth.src_mac = mac;
                }
            }

            if let Some(action) = self.tunnel_dst_action(out_swp, next_hop)? {
                actions.push(action);
            }
            actions.push(Action::output(out_swp.port));

            let mut flow_mod = FlowMod::new(hop_match, req.command);
            flow_mod.idle_timeout = self.settings.idle_timeout;
            flow_mod.hard_timeout = hard_timeout;
            flow_mod.priority = priority;
            flow_mod.cookie = req.cookie;
            flow_mod.flags = flags;
            flow_mod.actions = actions;

            if let Some(pin_port) = pin_port {
                if in_swp.switch == req.pin_switch && in_swp.port == pin_port {
                    src_switch_included = true;
                    packet_out_eth = Some(eth.clone());
                } else if in_swp.switch == req.pin_switch {
                    info!(
                        "Not sending packet-out on {:#x}: in port {} differs from packet-in port {} on route {}",
                        req.pin_switch, in_swp.port, pin_port, req.route
                    );
                }
            }

            hops.push(CompiledHop {
                switch: out_swp.switch,
                in_port: in_swp.port,
                out_port: out_swp.port,
                next_hop,
                flow_mod,
            });
        }

        let last = path[path.len() - 1];
        self.detect_tunnel_traffic(path[0], last, ip_addrs);

        for (hop_index, hop) in hops.iter().enumerate().rev() {
            let sw = self
                .services
                .switches
                .switch(hop.switch)
                .ok_or(Error::SwitchUnavailable(hop.switch))?;

            debug!(
                "Pushing route flow-mod hop={} sw={:#x} in_port={} out_port={}",
                hop_index, hop.switch, hop.in_port, hop.out_port
            );
            if let Err(e) = self.write_message(sw.as_ref(), hop.flow_mod.clone().into()) {
                error!("Failure writing flow mod: {}", e);
                continue;
            }
            if req.flush {
                self.flush_switch(sw.as_ref());
            }

            if let Some(packet) = &packet_out_eth {
                if hop.switch == req.pin_switch && Some(hop.in_port) == pin_port {
                    self.push_packet(packet, sw.as_ref(), hop.in_port, hop.out_port, hop.next_hop);
                    src_switch_included = true;
                }
            }

            // Only the ingress rule carries per-device state (MAC rewrite)
            if hop_index == 0 {
                trace!("Cache the flow {} on {:#x}", hop.flow_mod.of_match, hop.switch);
                self.services.flow_cache.add_flow(FlowCacheEntry {
                    app_instance: ctx.app_instance().to_string(),
                    switch: hop.switch,
                    of_match: hop.flow_mod.of_match,
                    cookie: req.cookie,
                    src_port: path[0],
                    priority: hop.flow_mod.priority,
                    action: FlowAction::Permit,
                });
            }
        }

        Ok(src_switch_included)
    }

    /// The one VLAN the source device uses in the broadcast domain of the
    /// first-hop input port
    fn first_hop_vlan(
        &self,
        src_device: &Device,
        first_hop_input: SwitchPort,
        tunnel_enabled: bool,
    ) -> Result<u16> {
        let vlans = src_device
            .attachment_points
            .iter()
            .find(|ap| {
                self.services
                    .topology
                    .is_in_same_broadcast_domain(**ap, first_hop_input, tunnel_enabled)
            })
            .map(|ap| src_device.switch_port_vlan_ids(ap));

        match vlans {
            Some([vlan]) => Ok(*vlan),
            _ => Err(Error::AmbiguousVlan {
                device: src_device.to_string(),
                port: first_hop_input,
            }),
        }
    }

    /// Tunnel destination action when `out` is the switch's tunnel port
    fn tunnel_dst_action(
        &self,
        out: SwitchPort,
        next_hop: Option<DatapathId>,
    ) -> Result<Option<Action>> {
        if self.services.tunnels.tunnel_port_number(out.switch) != Some(out.port) {
            return Ok(None);
        }
        let next_hop = next_hop.ok_or_else(|| {
            Error::Tunnel(format!(
                "output to tunnel port {} has no next switch defined",
                out
            ))
        })?;
        let ip = self.services.tunnels.tunnel_ip_addr(next_hop).ok_or_else(|| {
            Error::Tunnel(format!(
                "IP address of tunnel port is not defined for {:#x}",
                next_hop
            ))
        })?;
        Ok(Some(Action::SetTunnelDst(ip)))
    }

    /// Packet-out of an unbuffered packet through one port
    pub(crate) fn push_packet(
        &self,
        packet: &EthernetPacket,
        sw: &dyn OfSwitch,
        in_port: PortNo,
        out_port: PortNo,
        next_hop: Option<DatapathId>,
    ) {
        trace!(
            "PacketOut sw={:#x} in_port={} out_port={}",
            sw.id(),
            in_port,
            out_port
        );
        let mut actions = Vec::with_capacity(2);
        match self.tunnel_dst_action(SwitchPort::new(sw.id(), out_port), next_hop) {
            Ok(Some(action)) => actions.push(action),
            Ok(None) => {}
            Err(e) => {
                error!("Cannot push packet: {}", e);
                return;
            }
        }
        actions.push(Action::output(out_port));

        let po = PacketOut::unbuffered(in_port, actions, packet.to_bytes());
        if let Err(e) = self.write_message(sw, po.into()) {
            error!("Failure writing packet out: {}", e);
        }
    }

    /// Packet-out with one output action per port
    pub(crate) fn packet_out_multi_port(
        &self,
        packet: &EthernetPacket,
        sw: &dyn OfSwitch,
        in_port: PortNo,
        out_ports: impl IntoIterator<Item = PortNo>,
    ) {
        let actions: Vec<_> = out_ports.into_iter().map(Action::output).collect();
        if actions.is_empty() {
            return;
        }
        trace!(
            "PacketOut sw={:#x} in_port={} to {} ports",
            sw.id(),
            in_port,
            actions.len()
        );
        let po = PacketOut::unbuffered(in_port, actions, packet.to_bytes());
        if let Err(e) = self.write_message(sw, po.into()) {
            error!("Failure writing packet out: {}", e);
        }
    }

    /// `[src] ++ interior(src → dst) ++ [dst]`.
    ///
    /// Used when the ends are tunnel-rewritten ports that a port-to-port
    /// query would not resolve; only one tunnel hop is supported. The
    /// interior always comes from the topology that includes tunnels.
    pub(crate) fn route_in_cluster(&self, src: SwitchPort, dst: SwitchPort) -> Option<Route> {
        let mut path = vec![src];
        if src.switch != dst.switch {
            let Some(interior) =
                self.services
                    .routing
                    .switch_route(src.switch, dst.switch, ROUTE_COOKIE, true)
            else {
                trace!(
                    "Failed to find intra-cluster route from {:#x} to {:#x}",
                    src.switch,
                    dst.switch
                );
                return None;
            };
            path.extend(interior.path);
        }
        path.push(dst);
        Some(Route::new(path))
    }
}

/// Log a failed route push at the level its cause deserves
pub(crate) fn log_push_error(err: &Error) {
    match err {
        Error::SwitchUnavailable(_) | Error::AmbiguousVlan { .. } => {
            warn!("Unable to push route: {}", err)
        }
        Error::PortForbidden(_) | Error::TtlExpired => debug!("Not pushing route: {}", err),
        _ => error!("Unable to push route: {}", err),
    }
}

/// Apply the final ingress MAC, final egress MAC and TTL decrement once.
/// Returns false if the TTL expired.
pub(crate) fn rewrite_for_replication(eth: &mut EthernetPacket, ctx: &PacketContext) -> bool {
    if let Some(mac) = ctx.rewrite.final_ingress_dst_mac {
        eth.dst_mac = mac;
    }
    if let Some(mac) = ctx.rewrite.final_egress_src_mac {
        eth.src_mac = mac;
    }
    match ctx.rewrite.ttl_decrement {
        Some(n) => eth.decrement_ttl(n),
        None => true,
    }
}

fn vlan_rewrite_action(orig: u16, vlan: u16) -> Option<Action> {
    if vlan == orig {
        None
    } else if vlan == VLAN_UNTAGGED {
        Some(Action::StripVlan)
    } else {
        Some(Action::SetVlanId(vlan))
    }
}

fn dst_mac_rewrite_action(orig: MacAddr, mac: MacAddr) -> Option<Action> {
    (orig != mac).then_some(Action::SetDlDst(mac))
}

fn src_mac_rewrite_action(orig: MacAddr, mac: MacAddr) -> Option<Action> {
    (orig != mac).then_some(Action::SetDlSrc(mac))
}
