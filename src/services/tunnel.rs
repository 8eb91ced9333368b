//! Tunnel endpoint queries

use super::Device;
use crate::openflow::{DatapathId, PortNo};
use std::net::Ipv4Addr;

pub trait TunnelInfo: Send + Sync {
    fn is_tunnel_endpoint(&self, device: &Device) -> bool;

    /// Encapsulating tunnel port on `switch`
    fn tunnel_port_number(&self, switch: DatapathId) -> Option<PortNo>;

    /// Loopback port terminating decapsulated tunnel traffic on `switch`
    fn tunnel_loopback_port(&self, switch: DatapathId) -> Option<PortNo>;

    fn tunnel_ip_addr(&self, switch: DatapathId) -> Option<Ipv4Addr>;

    /// Switch owning the tunnel endpoint address `ip`
    fn switch_for_tunnel_ip(&self, ip: Ipv4Addr) -> Option<DatapathId>;

    fn is_tunnel_subnet(&self, ip: Ipv4Addr) -> bool;
}

/// Deployment without tunnels
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTunnels;

impl TunnelInfo for NoTunnels {
    fn is_tunnel_endpoint(&self, _device: &Device) -> bool {
        false
    }

    fn tunnel_port_number(&self, _switch: DatapathId) -> Option<PortNo> {
        None
    }

    fn tunnel_loopback_port(&self, _switch: DatapathId) -> Option<PortNo> {
        None
    }

    fn tunnel_ip_addr(&self, _switch: DatapathId) -> Option<Ipv4Addr> {
        None
    }

    fn switch_for_tunnel_ip(&self, _ip: Ipv4Addr) -> Option<DatapathId> {
        None
    }

    fn is_tunnel_subnet(&self, _ip: Ipv4Addr) -> bool {
        false
    }
}
