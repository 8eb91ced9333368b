//! Flows that start or end at a tunnel loopback port

use super::Forwarding;
use crate::services::SwitchPort;
use std::net::Ipv4Addr;
use tracing::debug;

impl Forwarding {
    /// Report tunnel endpoints reached through a loopback port to the
    /// topology, before the route's rules are written.
    pub(crate) fn detect_tunnel_traffic(
        &self,
        first: SwitchPort,
        last: SwitchPort,
        ip_addrs: Option<(Ipv4Addr, Ipv4Addr)>,
    ) {
        let tunnels = &self.services.tunnels;
        let is_loopback = |swp: SwitchPort| tunnels.tunnel_loopback_port(swp.switch) == Some(swp.port);

        if is_loopback(first) {
            if is_loopback(last) {
                return;
            }
            let Some((_, dst_ip)) = ip_addrs else {
                return;
            };
            if let Some(dst_switch) = tunnels.switch_for_tunnel_ip(dst_ip) {
                debug!(
                    "Tunnel source detected: {:#x} towards {:#x}",
                    first.switch, dst_switch
                );
                self.services
                    .topology
                    .detect_tunnel_source(first.switch, dst_switch);
            }
        } else if is_loopback(last) {
            let Some((src_ip, _)) = ip_addrs else {
                return;
            };
            if let Some(src_switch) = tunnels.switch_for_tunnel_ip(src_ip) {
                debug!(
                    "Tunnel destination detected: {:#x} from {:#x}",
                    last.switch, src_switch
                );
                self.services
                    .topology
                    .detect_tunnel_destination(src_switch, last.switch);
            }
        }
    }
}
