//! ofroute - OpenFlow forwarding core
//!
//! Executes routing decisions for packet-ins: compiles routes into per-hop
//! OpenFlow 1.0 rules with header rewrites, floods and replicates within
//! the ingress domain, and re-derives installed rules for the flow
//! reconciler. Topology, routing, devices and switches are reached through
//! the traits in [`services`].

pub mod config;
pub mod error;
pub mod forwarding;
pub mod openflow;
pub mod protocol;
pub mod services;
pub mod telemetry;

pub use error::{Error, Result};
