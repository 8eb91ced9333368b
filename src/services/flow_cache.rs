//! Record of installed flows, used to drive reconciliation

use super::SwitchPort;
use crate::openflow::{DatapathId, OfMatch};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Permit,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowCacheEntry {
    pub app_instance: String,
    pub switch: DatapathId,
    pub of_match: OfMatch,
    pub cookie: u64,
    /// Ingress attachment point of the flow's source
    pub src_port: SwitchPort,
    pub priority: u16,
    pub action: FlowAction,
}

pub trait FlowCache: Send + Sync {
    /// Record an installed flow; returns false if it replaced an active entry
    fn add_flow(&self, entry: FlowCacheEntry) -> bool;

    /// Mark the flow (switch, match) as removed by the switch
    fn flow_removed(&self, switch: DatapathId, of_match: &OfMatch) -> bool;

    /// Move a flow to another application instance
    fn move_flow_to_app_instance(
        &self,
        switch: DatapathId,
        of_match: &OfMatch,
        app_instance: &str,
    ) -> bool;
}

#[derive(Debug)]
struct Slot {
    entry: FlowCacheEntry,
    active: bool,
}

/// In-memory flow cache keyed by (switch, match)
#[derive(Debug, Default)]
pub struct MemoryFlowCache {
    flows: RwLock<HashMap<(DatapathId, OfMatch), Slot>>,
}

impl MemoryFlowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.count(true)
    }

    pub fn inactive_count(&self) -> usize {
        self.count(false)
    }

    fn count(&self, active: bool) -> usize {
        self.flows
            .read()
            .map(|flows| flows.values().filter(|slot| slot.active == active).count())
            .unwrap_or(0)
    }

    pub fn get(&self, switch: DatapathId, of_match: &OfMatch) -> Option<FlowCacheEntry> {
        let flows = self.flows.read().ok()?;
        flows
            .get(&(switch, *of_match))
            .filter(|slot| slot.active)
            .map(|slot| slot.entry.clone())
    }

    /// Active flows of one application instance
    pub fn flows_for_app_instance(&self, app_instance: &str) -> Vec<FlowCacheEntry> {
        self.flows
            .read()
            .map(|flows| {
                flows
                    .values()
                    .filter(|slot| slot.active && slot.entry.app_instance == app_instance)
                    .map(|slot| slot.entry.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl FlowCache for MemoryFlowCache {
    fn add_flow(&self, entry: FlowCacheEntry) -> bool {
        let Ok(mut flows) = self.flows.write() else {
            return false;
        };
        let key = (entry.switch, entry.of_match);
        trace!("Caching flow on {:#x}: {}", entry.switch, entry.of_match);
        let replaced_active = flows
            .insert(key, Slot { entry, active: true })
            .map(|old| old.active)
            .unwrap_or(false);
        !replaced_active
    }

    fn flow_removed(&self, switch: DatapathId, of_match: &OfMatch) -> bool {
        let Ok(mut flows) = self.flows.write() else {
            return false;
        };
        match flows.get_mut(&(switch, *of_match)) {
            Some(slot) if slot.active => {
                slot.active = false;
                debug!("Flow deactivated on {:#x}: {}", switch, of_match);
                true
            }
            _ => false,
        }
    }

    fn move_flow_to_app_instance(
        &self,
        switch: DatapathId,
        of_match: &OfMatch,
        app_instance: &str,
    ) -> bool {
        let Ok(mut flows) = self.flows.write() else {
            return false;
        };
        match flows.get_mut(&(switch, *of_match)) {
            Some(slot) => {
                slot.entry.app_instance = app_instance.to_string();
                true
            }
            None => false,
        }
    }
}
