//! Forwarding core
//!
//! Turns a routing decision for a packet-in into switch state: compiled
//! per-hop flow rules, packet-outs, floods and multicast replication. The
//! same machinery re-derives installed rules when the flow reconciler
//! reports a topology or device change.

mod compiler;
mod context;
mod decision;
mod deny;
mod discovery;
mod flood;
mod multicast;
mod port_groups;
mod reconcile;
mod tunnel_traffic;
mod unicast;
mod wildcard;

pub use compiler::RouteRequest;
pub use context::{PacketContext, RewriteRule, DEFAULT_APP_INSTANCE};
pub use decision::{RoutingAction, RoutingDecision};
pub use port_groups::PortGroups;
pub use reconcile::{MatchReconcile, ReconcileAction};
pub use wildcard::{wildcard, wildcard_mask};

use crate::config::{access_priority_from_rows, ForwardingConfigRow, ForwardingSettings};
use crate::openflow::{DatapathId, OfMessage, PacketIn, PortNo};
use crate::protocol::ethernet::EthernetPacket;
use crate::services::{BroadcastCache, OfSwitch, Services, SwitchPort, TimedBroadcastCache};
use crate::telemetry::{MetricsRegistry, WriteKind};
use crate::Result;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Application id of the forwarding module in flow cookies
pub const FORWARDING_APP_ID: u64 = 2;

/// Cookie carried by every rule this module installs: the application id
/// in the top 12 bits, no user bits.
pub const APP_COOKIE: u64 = FORWARDING_APP_ID << 52;

/// Cookie for route queries; multipath hashing by MAC is disabled.
const ROUTE_COOKIE: u64 = 0;

/// Whether later packet-in listeners still see the packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Continue,
    Stop,
}

pub struct Forwarding {
    services: Services,
    settings: ForwardingSettings,
    access_priority: AtomicU16,
    broadcast_cache_enabled: AtomicBool,
    /// Dedup scoped to the ingress switch (floods)
    switch_broadcast_cache: Arc<dyn BroadcastCache>,
    /// Dedup scoped to the ingress L2 domain (multicast)
    cluster_broadcast_cache: Arc<dyn BroadcastCache>,
    metrics: Arc<MetricsRegistry>,
}

impl Forwarding {
    pub fn new(
        services: Services,
        settings: ForwardingSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let window = settings.broadcast_cache_window;
        Self {
            services,
            access_priority: AtomicU16::new(settings.access_priority),
            broadcast_cache_enabled: AtomicBool::new(settings.broadcast_cache),
            switch_broadcast_cache: Arc::new(TimedBroadcastCache::new(window)),
            cluster_broadcast_cache: Arc::new(TimedBroadcastCache::new(window)),
            settings,
            metrics,
        }
    }

    /// Replace both dedup caches
    pub fn with_broadcast_caches(
        mut self,
        switch_cache: Arc<dyn BroadcastCache>,
        cluster_cache: Arc<dyn BroadcastCache>,
    ) -> Self {
        self.switch_broadcast_cache = switch_cache;
        self.cluster_broadcast_cache = cluster_cache;
        self
    }

    pub fn access_priority(&self) -> u16 {
        self.access_priority.load(Ordering::Relaxed)
    }

    pub fn set_access_priority(&self, priority: u16) {
        self.access_priority.store(priority, Ordering::Relaxed);
    }

    /// Re-read the persisted `controller_forwardingconfig` rows
    pub fn reload_access_priority(&self, rows: &[ForwardingConfigRow]) {
        debug!("Forwarding configuration modified ({} rows)", rows.len());
        self.set_access_priority(access_priority_from_rows(rows));
    }

    pub fn set_broadcast_cache(&self, enabled: bool) {
        self.broadcast_cache_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn broadcast_cache(&self) -> bool {
        self.broadcast_cache_enabled.load(Ordering::Relaxed)
    }

    pub fn truncated_packets_seen(&self) -> u64 {
        self.metrics.truncated_packets_seen.get()
    }

    /// Act on the routing decision carried in `ctx` for a packet-in
    /// received on `switch`.
    pub fn process_packet_in(
        &self,
        switch: DatapathId,
        packet_in: &PacketIn,
        ctx: &PacketContext,
    ) -> Command {
        let Some(decision) = ctx.decision.as_ref() else {
            debug!(
                "No decision made for packet-in on {:#x} port {}",
                switch, packet_in.in_port
            );
            return Command::Continue;
        };

        match &decision.action {
            RoutingAction::None => Command::Continue,
            RoutingAction::Drop => {
                self.do_drop_flow(packet_in, decision, ctx);
                Command::Stop
            }
            RoutingAction::Forward { .. } | RoutingAction::ForwardOrFlood { .. } => {
                self.do_forward_flow(packet_in, switch, decision, ctx);
                Command::Stop
            }
            RoutingAction::Multicast { .. } => {
                if !self.in_cluster_broadcast_cache(switch, packet_in) {
                    self.do_multicast(packet_in, decision, ctx);
                }
                Command::Stop
            }
        }
    }

    /// Push `packet` out of `swp` with the egress VLAN the address space
    /// allows there.
    #[allow(clippy::too_many_arguments)]
    pub fn push_packet_out_to_egress_port(
        &self,
        packet: &EthernetPacket,
        in_port: PortNo,
        swp: SwitchPort,
        tunnel_enabled: bool,
        address_space: Option<&str>,
        vlan: u16,
        flush: bool,
    ) -> bool {
        let Some(address_space) = address_space else {
            warn!("Cannot push packet out {}: no address space", swp);
            return false;
        };
        let Some(sw) = self.services.switches.switch(swp.switch) else {
            warn!(
                "Cannot push packet out {}: switch {:#x} not available",
                swp, swp.switch
            );
            return false;
        };
        let Some(egress_vlan) = self.services.rewrite.switch_port_vlan_mode(
            swp,
            address_space,
            vlan,
            tunnel_enabled,
        ) else {
            debug!(
                "Not pushing packet out {}: forbidden for address space {}",
                swp, address_space
            );
            return false;
        };

        let mut packet = packet.clone();
        packet.set_vlan_id(egress_vlan);
        self.push_packet(&packet, sw.as_ref(), in_port, swp.port, None);
        if flush {
            self.flush_switch(sw.as_ref());
        }
        true
    }

    /// Checks the decision carries what its action needs
    fn validate_decision(&self, decision: &RoutingDecision) -> bool {
        let needs_source_device = match &decision.action {
            RoutingAction::None => return true,
            RoutingAction::Forward { .. }
            | RoutingAction::ForwardOrFlood { .. }
            | RoutingAction::Drop => true,
            RoutingAction::Multicast { .. } => false,
        };

        if needs_source_device && decision.source_device.is_none() {
            error!(
                "No source device found for {} decision",
                decision.action.name()
            );
            return false;
        }
        let Some(src_port) = decision.source_port else {
            error!(
                "No source switchport-tuple for {} decision",
                decision.action.name()
            );
            return false;
        };
        if self.services.switches.switch(src_port.switch).is_none() {
            error!(
                "No source switch found for switchport-tuple={} in {} decision",
                src_port,
                decision.action.name()
            );
            return false;
        }

        if let RoutingAction::Multicast {
            devices,
            interfaces,
        } = &decision.action
        {
            if devices.is_empty() && interfaces.is_empty() {
                error!("No destination interfaces or devices found for MULTICAST decision");
                return false;
            }
        }
        true
    }

    fn in_switch_broadcast_cache(&self, switch: DatapathId, packet_in: &PacketIn) -> bool {
        self.broadcast_cache()
            && self
                .switch_broadcast_cache
                .check_and_record(switch, &packet_in.data)
    }

    fn in_cluster_broadcast_cache(&self, switch: DatapathId, packet_in: &PacketIn) -> bool {
        if !self.broadcast_cache() {
            return false;
        }
        let cluster = self.services.topology.l2_domain_id(switch, true);
        self.cluster_broadcast_cache
            .check_and_record(cluster, &packet_in.data)
    }

    /// Write one message, counting it per switch
    fn write_message(&self, sw: &dyn OfSwitch, msg: OfMessage) -> Result<()> {
        let kind = match &msg {
            OfMessage::FlowMod(_) => WriteKind::FlowMod,
            OfMessage::PacketOut(_) => WriteKind::PacketOut,
        };
        let dpid = sw.id();
        match sw.write(msg) {
            Ok(()) => {
                self.metrics.record_write(dpid, kind);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_write_error(dpid);
                Err(e)
            }
        }
    }

    fn flush_switch(&self, sw: &dyn OfSwitch) {
        match sw.flush() {
            Ok(()) => self.metrics.flushes.inc(),
            Err(e) => {
                self.metrics.record_write_error(sw.id());
                error!("Failure flushing switch {:#x}: {}", sw.id(), e);
            }
        }
    }
}
