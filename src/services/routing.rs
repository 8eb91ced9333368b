//! Paths between switch ports and the route computation capability

use super::SwitchPort;
use crate::openflow::DatapathId;
use std::fmt;

/// Alternating (in, out) switch ports, one pair per hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: Vec<SwitchPort>,
}

impl Route {
    pub fn new(path: Vec<SwitchPort>) -> Self {
        Self { path }
    }

    pub fn hops(&self) -> usize {
        self.path.len() / 2
    }

    pub fn contains(&self, swp: &SwitchPort) -> bool {
        self.path.contains(swp)
    }

    /// Even and non-empty
    pub fn is_well_formed(&self) -> bool {
        !self.path.is_empty() && self.path.len() % 2 == 0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, swp) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", swp)?;
        }
        write!(f, "]")
    }
}

/// Path computation
pub trait Routing: Send + Sync {
    /// Port-to-port route, including the end ports
    fn route(
        &self,
        src: SwitchPort,
        dst: SwitchPort,
        cookie: u64,
        tunnel_enabled: bool,
    ) -> Option<Route>;

    /// Interior switch-to-switch route (inter-switch link ports only)
    fn switch_route(
        &self,
        src: DatapathId,
        dst: DatapathId,
        cookie: u64,
        tunnel_enabled: bool,
    ) -> Option<Route>;
}
