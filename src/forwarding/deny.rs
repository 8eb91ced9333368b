//! Drop rules, for packet-ins and for reconciled flows

use super::{wildcard, Forwarding, MatchReconcile, PacketContext, RoutingDecision, APP_COOKIE};
use crate::openflow::{
    FlowMod, FlowModCommand, OfMatch, PacketIn, BUFFER_ID_NONE, OFPFF_SEND_FLOW_REM, OFPP_NONE,
};
use crate::services::{FlowAction, FlowCacheEntry, SwitchPort};
use tracing::{debug, error, warn};

/// Idle timeout of a drop rule that replaces a reconciled flow
const RECONCILED_DROP_IDLE_TIMEOUT: u16 = 5;

impl Forwarding {
    /// Install a rule without actions for the packet and record it as a
    /// deny flow.
    pub(crate) fn do_drop_flow(
        &self,
        packet_in: &PacketIn,
        decision: &RoutingDecision,
        ctx: &PacketContext,
    ) {
        if !self.validate_decision(decision) {
            return;
        }
        let Some(src_port) = decision.source_port else {
            return;
        };
        let Some(sw) = self.services.switches.switch(src_port.switch) else {
            return;
        };

        let of_match = match OfMatch::from_packet(&packet_in.data, packet_in.in_port) {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot build a drop rule from packet-in: {}", e);
                return;
            }
        };
        let of_match = wildcard(of_match, &sw.attributes(), decision.wildcards, true, false);

        let mut flow_mod = FlowMod::new(of_match, FlowModCommand::Add);
        flow_mod.cookie = APP_COOKIE;
        flow_mod.idle_timeout = self.settings.idle_timeout;
        flow_mod.hard_timeout = decision.hard_timeout;
        flow_mod.priority = self.access_priority();
        flow_mod.buffer_id = BUFFER_ID_NONE;
        flow_mod.flags = OFPFF_SEND_FLOW_REM;

        debug!("Pushing drop flow-mod sw={:#x} match={}", sw.id(), of_match);
        match self.write_message(sw.as_ref(), flow_mod.into()) {
            Ok(()) => {
                self.services.flow_cache.add_flow(FlowCacheEntry {
                    app_instance: ctx.app_instance().to_string(),
                    switch: src_port.switch,
                    of_match,
                    cookie: APP_COOKIE,
                    src_port,
                    priority: self.access_priority(),
                    action: FlowAction::Deny,
                });
            }
            Err(e) => error!("Failure writing deny flow mod: {}", e),
        }
    }

    /// Turn a reconciled flow into a drop rule in place
    pub(crate) fn do_drop_reconciled_flow_mod(&self, rc: &MatchReconcile) {
        let Some(sw) = self.services.switches.switch(rc.switch) else {
            warn!(
                "Cannot drop reconciled flow on {:#x}: switch not available",
                rc.switch
            );
            return;
        };

        let mut flow_mod = FlowMod::new(rc.of_match, FlowModCommand::Modify);
        flow_mod.cookie = rc.cookie;
        flow_mod.idle_timeout = RECONCILED_DROP_IDLE_TIMEOUT;
        flow_mod.hard_timeout = self.settings.hard_timeout;
        flow_mod.priority = self.access_priority();
        flow_mod.flags = OFPFF_SEND_FLOW_REM;

        debug!(
            "Reconciling flow to drop sw={:#x} match={}",
            rc.switch, rc.of_match
        );
        if let Err(e) = self.write_message(sw.as_ref(), flow_mod.into()) {
            error!("Failure writing deny flow mod: {}", e);
            return;
        }
        self.flush_switch(sw.as_ref());

        self.services.flow_cache.add_flow(FlowCacheEntry {
            app_instance: rc.app_instance.clone(),
            switch: rc.switch,
            of_match: rc.of_match,
            cookie: rc.cookie,
            src_port: SwitchPort::new(rc.switch, rc.of_match.in_port),
            priority: self.access_priority(),
            action: FlowAction::Deny,
        });
    }

    /// Remove a reconciled flow from its switch
    pub(crate) fn do_delete_reconciled_flow_mod(&self, rc: &MatchReconcile) {
        let Some(sw) = self.services.switches.switch(rc.switch) else {
            warn!(
                "Cannot delete reconciled flow on {:#x}: switch not available",
                rc.switch
            );
            return;
        };

        let mut flow_mod = FlowMod::new(rc.of_match, FlowModCommand::Delete);
        flow_mod.cookie = rc.cookie;
        flow_mod.priority = rc.priority;
        flow_mod.out_port = OFPP_NONE;
        flow_mod.idle_timeout = self.settings.idle_timeout;
        flow_mod.hard_timeout = self.settings.hard_timeout;

        debug!(
            "Deleting reconciled flow sw={:#x} match={}",
            rc.switch, rc.of_match
        );
        match self.write_message(sw.as_ref(), flow_mod.into()) {
            Ok(()) => self.flush_switch(sw.as_ref()),
            Err(e) => error!("Failed to delete flow mod: {}", e),
        }
    }
}
