//! Destination discovery by injected ARP probes
//!
//! The probe is fed back through the controller as if the switch had sent
//! it, so the normal flood path finds the destination and the device
//! manager learns its attachment point from the reply.

use super::{Forwarding, PacketContext};
use crate::openflow::{DatapathId, PacketIn};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::EthernetPacket;
use crate::protocol::{EtherType, MacAddr};
use crate::services::SwitchPort;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// RFC 5227 probe for `target_ip` on behalf of the sender of `eth`.
///
/// Sender IP and target MAC are zero so nothing learns a wrong binding.
pub fn arp_probe_frame(eth: &EthernetPacket, target_ip: Ipv4Addr) -> EthernetPacket {
    EthernetPacket {
        dst_mac: MacAddr::BROADCAST,
        src_mac: eth.src_mac,
        vlan: eth.vlan,
        ethertype: EtherType::Arp as u16,
        payload: ArpPacket::probe(eth.src_mac, target_ip).to_bytes().to_vec(),
    }
}

/// IPv4 unicast frames are the only ones worth probing for
fn probe_candidate(packet_in: &PacketIn) -> Option<(EthernetPacket, Ipv4Addr, Ipv4Addr)> {
    let eth = EthernetPacket::parse(&packet_in.data).ok()?;
    if eth.is_broadcast() {
        return None;
    }
    let (src_ip, dst_ip) = eth.ipv4_addrs()?;
    Some((eth, src_ip, dst_ip))
}

/// The packet's destination, or the original destination device's first
/// address when `orig_dst_preferred`.
fn target_ip(dst_ip: Ipv4Addr, ctx: &PacketContext, orig_dst_preferred: bool) -> Ipv4Addr {
    if !orig_dst_preferred {
        return dst_ip;
    }
    ctx.orig_dst_device
        .as_ref()
        .and_then(|device| device.first_ipv4())
        .unwrap_or(dst_ip)
}

impl Forwarding {
    /// Probe from the packet-in port, moved to the allowed incoming
    /// broadcast port when the packet arrived from a broadcast domain.
    pub(crate) fn inject_fake_arp_on_broadcast_port(
        &self,
        packet_in: &PacketIn,
        switch: DatapathId,
        ctx: &PacketContext,
        orig_dst_preferred: bool,
    ) -> bool {
        let Some((eth, src_ip, dst_ip)) = probe_candidate(packet_in) else {
            return false;
        };

        let tunnels = &self.services.tunnels;
        let tunnel_enabled = !(tunnels.is_tunnel_subnet(src_ip) || tunnels.is_tunnel_subnet(dst_ip));

        let mut inject_at = SwitchPort::new(switch, packet_in.in_port);
        let topology = &self.services.topology;
        if topology.is_broadcast_domain_port(inject_at, tunnel_enabled) {
            match topology.allowed_incoming_broadcast_port(inject_at, tunnel_enabled) {
                Some(allowed) => inject_at = allowed,
                None => {
                    warn!(
                        "Failed to inject Fake ARP since no incoming broadcast is allowed port for port {}",
                        inject_at
                    );
                    return false;
                }
            }
        }

        let target = target_ip(dst_ip, ctx, orig_dst_preferred);
        self.inject_fake_arp(&eth, inject_at, target, true)
    }

    /// Probe from the port allowed to receive unicast for the destination
    pub(crate) fn inject_fake_arp_on_unicast_port(
        &self,
        packet_in: &PacketIn,
        allowed_src: SwitchPort,
        ctx: &PacketContext,
        orig_dst_preferred: bool,
    ) -> bool {
        let Some((eth, _, dst_ip)) = probe_candidate(packet_in) else {
            return false;
        };
        let target = target_ip(dst_ip, ctx, orig_dst_preferred);
        self.inject_fake_arp(&eth, allowed_src, target, false)
    }

    fn inject_fake_arp(
        &self,
        eth: &EthernetPacket,
        at: SwitchPort,
        target_ip: Ipv4Addr,
        broadcast_port: bool,
    ) -> bool {
        let kind = if broadcast_port { "Bcast" } else { "Ucast" };
        if target_ip.is_unspecified() {
            debug!(
                "Skip ARP injection to discover invalid destination 0.0.0.0 on {} port {}",
                kind, at
            );
            return false;
        }

        let probe = arp_probe_frame(eth, target_ip);
        debug!(
            "Injecting ARP to discover destination {} on {} port {}",
            target_ip, kind, at
        );
        let injected = self
            .services
            .switches
            .inject_packet_in(at.switch, PacketIn::new(at.port, probe.to_bytes()));
        if injected {
            self.metrics.arp_probes_injected.inc();
        }
        injected
    }
}
