//! Re-deriving installed flows after topology or device changes

use super::compiler::log_push_error;
use super::{Command, Forwarding, PacketContext, RouteRequest, APP_COOKIE, ROUTE_COOKIE};
use crate::openflow::{DatapathId, FlowModCommand, OfMatch};
use crate::services::SwitchPort;
use tracing::{debug, trace, warn};

/// What the flow reconciler decided for one installed flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    NoChange,
    /// Recompute the path; the rule may move to other ports
    UpdatePath,
    NewEntry,
    Drop,
    Delete,
    /// Only the owning application instance changed
    AppInstanceChanged,
}

/// One installed flow handed back by the reconciler
#[derive(Debug, Clone)]
pub struct MatchReconcile {
    pub of_match: OfMatch,
    pub switch: DatapathId,
    pub app_instance: String,
    pub action: ReconcileAction,
    pub cookie: u64,
    pub priority: u16,
    /// Decision and rewrites to recompute with, if the reconciler has them
    pub cntx: Option<PacketContext>,
}

impl MatchReconcile {
    pub fn new(
        switch: DatapathId,
        of_match: OfMatch,
        app_instance: impl Into<String>,
        action: ReconcileAction,
    ) -> Self {
        Self {
            of_match,
            switch,
            app_instance: app_instance.into(),
            action,
            cookie: APP_COOKIE,
            priority: 0,
            cntx: None,
        }
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, ctx: PacketContext) -> Self {
        self.cntx = Some(ctx);
        self
    }
}

impl Forwarding {
    /// Apply the reconciler's verdicts in order. Later reconcile listeners
    /// never see these flows.
    pub fn reconcile_flows(&self, flows: &[MatchReconcile]) -> Command {
        for rc in flows {
            trace!(
                "Reconciling flow sw={:#x} match={} action={:?}",
                rc.switch,
                rc.of_match,
                rc.action
            );
            match rc.action {
                ReconcileAction::UpdatePath | ReconcileAction::NewEntry => {
                    self.do_push_reconciled_flow_mod(rc)
                }
                ReconcileAction::Drop => self.do_drop_reconciled_flow_mod(rc),
                ReconcileAction::Delete => self.do_delete_reconciled_flow_mod(rc),
                ReconcileAction::NoChange => {}
                ReconcileAction::AppInstanceChanged => {
                    self.services.flow_cache.move_flow_to_app_instance(
                        rc.switch,
                        &rc.of_match,
                        &rc.app_instance,
                    );
                }
            }
        }
        Command::Stop
    }

    /// Recompute the route of an installed flow and modify the rules in
    /// place, or delete the flow if it can no longer be routed.
    fn do_push_reconciled_flow_mod(&self, rc: &MatchReconcile) {
        let m = &rc.of_match;
        let devices = &self.services.devices;
        let topology = &self.services.topology;
        let switches = &self.services.switches;

        let Some(src_device) = devices.find_device(
            m.dl_src,
            Some(m.dl_vlan),
            Some(m.nw_src),
            Some(rc.switch),
            Some(m.in_port),
        ) else {
            warn!(
                "Cannot reconcile flow on {:#x}: no source device for {}",
                rc.switch, m
            );
            return;
        };
        if switches.switch(rc.switch).is_none() {
            debug!("Cannot reconcile flow: switch {:#x} not available", rc.switch);
            return;
        }
        let pin = SwitchPort::new(rc.switch, m.in_port);

        let mut ctx = rc.cntx.clone().unwrap_or_default();
        ctx.app_instance = Some(rc.app_instance.clone());

        let dst_device = match ctx.decision.as_ref().and_then(|d| d.first_destination()) {
            Some(dst) => Some(dst.clone()),
            None => devices.find_class_device(
                &src_device.entity_class,
                m.dl_dst,
                Some(m.dl_vlan),
                Some(m.nw_dst),
            ),
        };
        let Some(dst_device) = dst_device else {
            debug!("No destination for reconciled flow {}, deleting", m);
            self.do_delete_reconciled_flow_mod(rc);
            return;
        };

        let tunnel_enabled = self.tunnel_enabled_for(&src_device, &dst_device);
        let sw_cluster = topology.l2_domain_id(rc.switch, tunnel_enabled);

        if dst_device.attachment_points.is_empty() {
            debug!("Destination {} has no attachment point, deleting", dst_device);
            self.do_delete_reconciled_flow_mod(rc);
            return;
        }

        let orig_islands = match ctx
            .orig_dst_device
            .as_deref()
            .filter(|orig| self.services.tunnels.is_tunnel_endpoint(orig))
        {
            Some(orig) if orig.attachment_points.is_empty() => {
                debug!("Original destination {} has no attachment point, deleting", orig);
                self.do_delete_reconciled_flow_mod(rc);
                return;
            }
            Some(orig) => Some(self.islands(orig, tunnel_enabled)),
            None => None,
        };

        let src_islands = self.islands(&src_device, tunnel_enabled);
        let dst_islands = self.islands(&dst_device, tunnel_enabled);

        for (island, src_ap) in &src_islands {
            let Some(dst_ap) = dst_islands.get(island).copied() else {
                continue;
            };
            if *src_ap == dst_ap {
                continue;
            }
            if switches.switch(src_ap.switch).is_none() || switches.switch(dst_ap.switch).is_none() {
                continue;
            }

            let modified_src = match &orig_islands {
                Some(orig) => {
                    let Some(orig_ap) = orig.get(island).copied() else {
                        continue;
                    };
                    topology.incoming_switch_port(*src_ap, orig_ap, tunnel_enabled)
                }
                None => topology.incoming_switch_port(*src_ap, dst_ap, tunnel_enabled),
            };
            let modified_dst = topology.outgoing_switch_port(*src_ap, dst_ap, tunnel_enabled);
            let (Some(modified_src), Some(modified_dst)) = (modified_src, modified_dst) else {
                debug!(
                    "No incoming/outgoing ports between {} and {}, deleting",
                    src_ap, dst_ap
                );
                self.do_delete_reconciled_flow_mod(rc);
                continue;
            };

            // The flow enters at a host port the route no longer starts from
            if topology.l2_domain_id(pin.switch, tunnel_enabled)
                == topology.l2_domain_id(modified_src.switch, tunnel_enabled)
                && topology.is_attachment_point_port(pin, tunnel_enabled)
                && pin != modified_src
            {
                debug!(
                    "Flow ingress {} differs from route ingress {}, deleting",
                    pin, modified_src
                );
                self.do_delete_reconciled_flow_mod(rc);
                continue;
            }

            let route = if orig_islands.is_some() {
                self.route_in_cluster(modified_src, modified_dst)
            } else {
                self.services
                    .routing
                    .route(modified_src, modified_dst, ROUTE_COOKIE, tunnel_enabled)
            };

            match route {
                Some(route) => {
                    let req = RouteRequest {
                        route: &route,
                        src_device: &src_device,
                        of_match: Some(*m),
                        packet_in: None,
                        pin_switch: rc.switch,
                        cookie: APP_COOKIE,
                        wildcards: Some(m.wildcards),
                        request_flow_removed: true,
                        flush: true,
                        command: FlowModCommand::Modify,
                        tunnel_enabled,
                    };
                    if let Err(e) = self.push_rewrite_route(&req, &ctx) {
                        log_push_error(&e);
                    }
                }
                None if sw_cluster == *island => {
                    debug!(
                        "No route from {} to {} for reconciled flow, deleting",
                        modified_src, modified_dst
                    );
                    self.do_delete_reconciled_flow_mod(rc);
                    break;
                }
                None => {}
            }
        }
    }
}
