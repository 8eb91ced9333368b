//! Per-packet state threaded through the handlers

use super::RoutingDecision;
use crate::protocol::MacAddr;
use crate::services::Device;
use std::sync::Arc;

pub const DEFAULT_APP_INSTANCE: &str = "default";

/// Address-space rewrites that apply to one packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteRule {
    /// Destination MAC the packet carried before a virtual-MAC rewrite
    pub orig_ingress_dst_mac: Option<MacAddr>,
    /// Destination MAC written at the first hop
    pub final_ingress_dst_mac: Option<MacAddr>,
    /// Source MAC written at the last hop
    pub final_egress_src_mac: Option<MacAddr>,
    pub ttl_decrement: Option<u32>,
    pub transport_vlan: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct PacketContext {
    pub decision: Option<RoutingDecision>,
    pub rewrite: RewriteRule,
    /// Device the packet was addressed to before service rewriting
    pub orig_dst_device: Option<Arc<Device>>,
    pub app_instance: Option<String>,
}

impl PacketContext {
    pub fn new(decision: RoutingDecision) -> Self {
        Self {
            decision: Some(decision),
            ..Self::default()
        }
    }

    pub fn with_rewrite(mut self, rewrite: RewriteRule) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn with_orig_dst_device(mut self, device: Arc<Device>) -> Self {
        self.orig_dst_device = Some(device);
        self
    }

    pub fn with_app_instance(mut self, name: impl Into<String>) -> Self {
        self.app_instance = Some(name.into());
        self
    }

    /// Flow-cache application instance; [`DEFAULT_APP_INSTANCE`] if unset
    pub fn app_instance(&self) -> &str {
        self.app_instance.as_deref().unwrap_or(DEFAULT_APP_INSTANCE)
    }
}
