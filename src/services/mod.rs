//! Collaborator capabilities the forwarding core is wired with
//!
//! Each trait is a narrow view of one controller service. Production
//! wiring supplies the real services; tests supply in-memory fakes.

pub mod broadcast_cache;
pub mod device;
pub mod flow_cache;
pub mod rewrite;
pub mod routing;
pub mod switch;
pub mod topology;
pub mod tunnel;

pub use broadcast_cache::{BroadcastCache, TimedBroadcastCache};
pub use device::{Device, DeviceLookup, SwitchPort};
pub use flow_cache::{FlowAction, FlowCache, FlowCacheEntry, MemoryFlowCache};
pub use rewrite::{KeepVlan, RewriteService};
pub use routing::{Route, Routing};
pub use switch::{OfSwitch, SwitchAttributes, SwitchProvider};
pub use topology::Topology;
pub use tunnel::{NoTunnels, TunnelInfo};

use std::sync::Arc;

/// The full set of collaborators
#[derive(Clone)]
pub struct Services {
    pub switches: Arc<dyn SwitchProvider>,
    pub topology: Arc<dyn Topology>,
    pub routing: Arc<dyn Routing>,
    pub devices: Arc<dyn DeviceLookup>,
    pub tunnels: Arc<dyn TunnelInfo>,
    pub rewrite: Arc<dyn RewriteService>,
    pub flow_cache: Arc<dyn FlowCache>,
}
