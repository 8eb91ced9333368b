//! Replication targets grouped by switch and egress VLAN

use crate::openflow::{DatapathId, PortNo};
use std::collections::{BTreeMap, BTreeSet};

/// switch -> egress VLAN -> output ports.
///
/// A port belongs to at most one VLAN group on its switch; the first
/// VLAN it is added with wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortGroups {
    switches: BTreeMap<DatapathId, BTreeMap<u16, BTreeSet<PortNo>>>,
}

impl PortGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the port was already grouped on `switch`
    pub fn add(&mut self, switch: DatapathId, vlan: u16, port: PortNo) -> bool {
        let groups = self.switches.entry(switch).or_default();
        if groups.values().any(|ports| ports.contains(&port)) {
            return false;
        }
        groups.entry(vlan).or_default().insert(port)
    }

    pub fn contains(&self, switch: DatapathId, port: PortNo) -> bool {
        self.switches
            .get(&switch)
            .is_some_and(|groups| groups.values().any(|ports| ports.contains(&port)))
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Ascending by switch, then VLAN
    pub fn iter(&self) -> impl Iterator<Item = (DatapathId, &BTreeMap<u16, BTreeSet<PortNo>>)> {
        self.switches.iter().map(|(dpid, groups)| (*dpid, groups))
    }

    pub fn groups(&self, switch: DatapathId) -> Option<&BTreeMap<u16, BTreeSet<PortNo>>> {
        self.switches.get(&switch)
    }
}
