//! Address-space VLAN policy

use super::SwitchPort;

pub trait RewriteService: Send + Sync {
    /// VLAN a packet of `address_space`, currently tagged `current_vlan`,
    /// must carry when leaving `swp`. `None` forbids the port.
    fn switch_port_vlan_mode(
        &self,
        swp: SwitchPort,
        address_space: &str,
        current_vlan: u16,
        tunnel_enabled: bool,
    ) -> Option<u16>;
}

/// Leaves the VLAN untouched on every port
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepVlan;

impl RewriteService for KeepVlan {
    fn switch_port_vlan_mode(
        &self,
        _swp: SwitchPort,
        _address_space: &str,
        current_vlan: u16,
        _tunnel_enabled: bool,
    ) -> Option<u16> {
        Some(current_vlan)
    }
}
