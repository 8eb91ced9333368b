//! Routing decisions handed down by the policy layer

use crate::services::{Device, SwitchPort};
use std::sync::Arc;

/// What to do with a packet, with the destinations each verdict needs
#[derive(Debug, Clone, Default)]
pub enum RoutingAction {
    #[default]
    None,
    Drop,
    Forward {
        destinations: Vec<Arc<Device>>,
    },
    /// Forward if the destination is known, otherwise flood
    ForwardOrFlood {
        destinations: Vec<Arc<Device>>,
    },
    Multicast {
        devices: Vec<Arc<Device>>,
        interfaces: Vec<SwitchPort>,
    },
}

impl RoutingAction {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingAction::None => "NONE",
            RoutingAction::Drop => "DROP",
            RoutingAction::Forward { .. } => "FORWARD",
            RoutingAction::ForwardOrFlood { .. } => "FORWARD_OR_FLOOD",
            RoutingAction::Multicast { .. } => "MULTICAST",
        }
    }
}

/// Per-packet verdict. Immutable for the lifetime of one packet-in.
#[derive(Debug, Clone, Default)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub source_device: Option<Arc<Device>>,
    pub source_port: Option<SwitchPort>,
    /// Wildcard hint for installed rules; `None` means wildcard everything
    /// the policy allows
    pub wildcards: Option<u32>,
    pub hard_timeout: u16,
}

impl RoutingDecision {
    pub fn new(action: RoutingAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, device: Arc<Device>, port: SwitchPort) -> Self {
        self.source_device = Some(device);
        self.source_port = Some(port);
        self
    }

    pub fn with_wildcards(mut self, wildcards: u32) -> Self {
        self.wildcards = Some(wildcards);
        self
    }

    pub fn with_hard_timeout(mut self, hard_timeout: u16) -> Self {
        self.hard_timeout = hard_timeout;
        self
    }

    /// First destination device of a unicast verdict
    pub fn first_destination(&self) -> Option<&Arc<Device>> {
        match &self.action {
            RoutingAction::Forward { destinations }
            | RoutingAction::ForwardOrFlood { destinations } => destinations.first(),
            _ => None,
        }
    }
}
