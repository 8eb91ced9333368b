//! Devices, their attachment points, and the lookup capability

use crate::openflow::{DatapathId, PortNo};
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// A (switch, port) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchPort {
    pub switch: DatapathId,
    pub port: PortNo,
}

impl SwitchPort {
    pub fn new(switch: DatapathId, port: PortNo) -> Self {
        Self { switch, port }
    }
}

impl fmt::Display for SwitchPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}/{}", self.switch, self.port)
    }
}

/// An end host as tracked by the device manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub mac: MacAddr,
    /// Address space the device belongs to
    pub entity_class: String,
    pub ipv4: Vec<Ipv4Addr>,
    /// At most one per L2 island
    pub attachment_points: Vec<SwitchPort>,
    port_vlans: HashMap<SwitchPort, Vec<u16>>,
}

impl Device {
    pub fn new(mac: MacAddr, entity_class: impl Into<String>) -> Self {
        Self {
            mac,
            entity_class: entity_class.into(),
            ipv4: Vec::new(),
            attachment_points: Vec::new(),
            port_vlans: HashMap::new(),
        }
    }

    pub fn with_ipv4(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4.push(ip);
        self
    }

    /// Attach the device at `swp`, seen with the given VLAN ids
    pub fn with_attachment_point(mut self, swp: SwitchPort, vlans: &[u16]) -> Self {
        if !self.attachment_points.contains(&swp) {
            self.attachment_points.push(swp);
        }
        self.port_vlans.insert(swp, vlans.to_vec());
        self
    }

    pub fn address_space(&self) -> &str {
        &self.entity_class
    }

    /// VLAN ids the device was observed with on `swp`
    pub fn switch_port_vlan_ids(&self, swp: &SwitchPort) -> &[u16] {
        self.port_vlans.get(swp).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4.first().copied()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device[mac={}, class={}", self.mac, self.entity_class)?;
        if let Some(ip) = self.first_ipv4() {
            write!(f, ", ip={}", ip)?;
        }
        write!(f, ", aps=[")?;
        for (i, ap) in self.attachment_points.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ap)?;
        }
        write!(f, "]]")
    }
}

/// Device manager queries
pub trait DeviceLookup: Send + Sync {
    /// Device seen with this source MAC/VLAN/IP at the given switch port
    fn find_device(
        &self,
        mac: MacAddr,
        vlan: Option<u16>,
        ipv4: Option<Ipv4Addr>,
        switch: Option<DatapathId>,
        port: Option<PortNo>,
    ) -> Option<Arc<Device>>;

    /// Device in the same entity class as `entity_class`
    fn find_class_device(
        &self,
        entity_class: &str,
        mac: MacAddr,
        vlan: Option<u16>,
        ipv4: Option<Ipv4Addr>,
    ) -> Option<Arc<Device>>;
}
