//! Forwarding core driven through in-memory collaborators
//!
//! Run with: cargo test --test forwarding


use fakes::{FakeRouting, FakeTopology, FakeTunnels, Net, NetBuilder, PortVlans, TunnelDetection};
use ofroute::config::ForwardingConfigRow;
use ofroute::forwarding::{
    Command, MatchReconcile, PacketContext, ReconcileAction, RewriteRule, RouteRequest,
    RoutingAction, RoutingDecision, APP_COOKIE,
};
use ofroute::openflow::wildcards::{DL_DST, DL_SRC, DL_TYPE, DL_VLAN, IN_PORT};
use ofroute::openflow::{
    port, Action, FlowModCommand, OfMatch, OfMessage, PacketIn, OFPFF_SEND_FLOW_REM,
};
use ofroute::protocol::arp::ArpPacket;
use ofroute::protocol::ethernet::EthernetPacket;
use ofroute::protocol::ipv4::{Ipv4Builder, Ipv4Header};
use ofroute::protocol::{EtherType, MacAddr, VLAN_UNTAGGED};
use ofroute::services::{
    Device, FlowAction, FlowCache, FlowCacheEntry, Route, SwitchAttributes, SwitchPort,
};
use ofroute::Error;
use std::net::Ipv4Addr;
use std::sync::Arc;

const MAC_A: u64 = 0x0000_0000_00aa;
const MAC_B: u64 = 0x0000_0000_00bb;
const IP_A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const IP_B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

fn swp(switch: u64, port: u16) -> SwitchPort {
    SwitchPort::new(switch, port)
}

fn ipv4_frame(dst: MacAddr) -> EthernetPacket {
    let payload = Ipv4Builder::new()
        .src_addr(IP_A)
        .dst_addr(IP_B)
        .protocol(17)
        .payload(&[0x04, 0x00, 0x00, 0x35, 0, 8, 0, 0])
        .build();
    EthernetPacket {
        dst_mac: dst,
        src_mac: MacAddr::from_u64(MAC_A),
        vlan: None,
        ethertype: EtherType::Ipv4 as u16,
        payload,
    }
}

fn packet_in(in_port: u16) -> PacketIn {
    PacketIn::new(in_port, ipv4_frame(MacAddr::from_u64(MAC_B)).to_bytes())
}

fn host_a(at: SwitchPort) -> Arc<Device> {
    Arc::new(
        Device::new(MacAddr::from_u64(MAC_A), "default")
            .with_ipv4(IP_A)
            .with_attachment_point(at, &[VLAN_UNTAGGED]),
    )
}

fn host_b(at: Option<SwitchPort>) -> Arc<Device> {
    let device = Device::new(MacAddr::from_u64(MAC_B), "default").with_ipv4(IP_B);
    Arc::new(match at {
        Some(at) => device.with_attachment_point(at, &[VLAN_UNTAGGED]),
        None => device,
    })
}

fn forward(src: &Arc<Device>, pin: SwitchPort, dst: &Arc<Device>) -> PacketContext {
    PacketContext::new(
        RoutingDecision::new(RoutingAction::Forward {
            destinations: vec![dst.clone()],
        })
        .with_source(src.clone(), pin),
    )
}

fn route_request<'a>(
    route: &'a Route,
    src_device: &'a Device,
    packet_in: &'a PacketIn,
    pin_switch: u64,
) -> RouteRequest<'a> {
    RouteRequest {
        route,
        src_device,
        of_match: None,
        packet_in: Some(packet_in),
        pin_switch,
        cookie: APP_COOKIE,
        wildcards: None,
        request_flow_removed: true,
        flush: false,
        command: FlowModCommand::Add,
        tunnel_enabled: true,
    }
}

fn ttl_of(data: &[u8]) -> u8 {
    let eth = EthernetPacket::parse(data).unwrap();
    Ipv4Header::parse(&eth.payload).unwrap().ttl()
}

fn two_switch_topology() -> FakeTopology {
    FakeTopology::new()
        .switch(1, &[1, 2, 3])
        .switch(2, &[1, 2, 3])
        .link(swp(1, 3), swp(2, 3))
}

/// Host A on 1/1 talks to host B on 1/2 through a single switch
#[test]
fn test_single_switch_route_installs_one_rule() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2]))
        .devices(&[a.clone(), b.clone()])
        .build();

    let cmd = net
        .forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));
    assert_eq!(cmd, Command::Stop);

    let sw = net.switches.get(1);
    let flow_mods = sw.flow_mods();
    assert_eq!(flow_mods.len(), 1, "one rule per hop");
    let fm = &flow_mods[0];
    assert_eq!(fm.command, FlowModCommand::Add);
    assert_eq!(fm.output_ports(), vec![2]);
    assert_eq!(fm.idle_timeout, 5);
    assert_eq!(fm.hard_timeout, 0);
    assert_eq!(fm.priority, 10);
    assert_eq!(fm.cookie, APP_COOKIE);
    assert_eq!(fm.flags & OFPFF_SEND_FLOW_REM, OFPFF_SEND_FLOW_REM);
    assert_eq!(fm.of_match.in_port, 1);
    assert_eq!(fm.of_match.dl_src, MacAddr::from_u64(MAC_A));
    assert_eq!(fm.of_match.dl_dst, MacAddr::from_u64(MAC_B));
    assert_eq!(
        fm.of_match.wildcards & (IN_PORT | DL_VLAN | DL_SRC | DL_DST | DL_TYPE),
        0,
        "L2 fields stay exact"
    );

    // The triggering packet follows its rule
    let packet_outs = sw.packet_outs();
    assert_eq!(packet_outs.len(), 1);
    assert_eq!(packet_outs[0].in_port, 1);
    assert_eq!(packet_outs[0].output_ports(), vec![2]);

    let cached = net.flow_cache.get(1, &fm.of_match).expect("ingress rule cached");
    assert_eq!(cached.action, FlowAction::Permit);
    assert_eq!(cached.src_port, swp(1, 1));
    assert_eq!(cached.app_instance, "default");
    assert_eq!(net.flow_cache.active_count(), 1);
    assert_eq!(net.metrics.switch_totals(1), Some((1, 1, 0)));
}

#[test]
fn test_flow_removed_deactivates_cache_entry() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));
    let fm = net.switches.get(1).flow_mods().remove(0);

    assert!(net.flow_cache.flow_removed(1, &fm.of_match));
    assert_eq!(net.flow_cache.active_count(), 0);
    assert_eq!(net.flow_cache.inactive_count(), 1);
    // a second notification is a no-op
    assert!(!net.flow_cache.flow_removed(1, &fm.of_match));
}

/// Downstream switches get their rules before upstream ones
#[test]
fn test_multi_hop_rules_written_last_hop_first() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let routing = FakeRouting::new().with_route(&[swp(1, 1), swp(1, 3), swp(2, 3), swp(2, 2)]);
    let net = NetBuilder::new(&[1, 2], two_switch_topology())
        .routing(routing)
        .build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert_eq!(
        net.switches.write_order(),
        vec![(2, true), (1, true), (1, false)],
        "egress rule, ingress rule, then the packet-out"
    );
    assert_eq!(net.switches.get(2).flow_mods()[0].output_ports(), vec![2]);
    assert_eq!(net.switches.get(2).flow_mods()[0].of_match.in_port, 3);
    assert_eq!(net.switches.get(1).flow_mods()[0].output_ports(), vec![3]);
    assert_eq!(net.switches.get(1).packet_outs()[0].output_ports(), vec![3]);

    // only the ingress rule carries per-device state
    assert_eq!(net.flow_cache.active_count(), 1);
    let ingress = net.switches.get(1).flow_mods().remove(0);
    assert!(net.flow_cache.get(1, &ingress.of_match).is_some());
}

#[test]
fn test_mac_rewrites_on_first_and_last_hop() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let routing = FakeRouting::new().with_route(&[swp(1, 1), swp(1, 3), swp(2, 3), swp(2, 2)]);
    let net = NetBuilder::new(&[1, 2], two_switch_topology())
        .routing(routing)
        .build();

    let virtual_dst = MacAddr::from_u64(0x0200_0000_0001);
    let router_src = MacAddr::from_u64(0x0200_0000_0002);
    let ctx = forward(&a, swp(1, 1), &b).with_rewrite(RewriteRule {
        final_ingress_dst_mac: Some(virtual_dst),
        final_egress_src_mac: Some(router_src),
        ..Default::default()
    });
    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    let ingress = net.switches.get(1).flow_mods().remove(0);
    assert_eq!(
        ingress.actions,
        vec![Action::SetDlDst(virtual_dst), Action::output(3)]
    );

    let egress = net.switches.get(2).flow_mods().remove(0);
    assert_eq!(egress.of_match.dl_dst, virtual_dst, "matches the rewritten header");
    assert_eq!(
        egress.actions,
        vec![Action::SetDlSrc(router_src), Action::output(2)]
    );
}

#[test]
fn test_failed_write_skips_hop_and_continues() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let routing = FakeRouting::new().with_route(&[swp(1, 1), swp(1, 3), swp(2, 3), swp(2, 2)]);
    let net = NetBuilder::new(&[1, 2], two_switch_topology())
        .routing(routing)
        .build();
    net.switches.get(2).fail_writes(true);

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert!(net.switches.get(2).flow_mods().is_empty());
    assert_eq!(net.switches.get(1).flow_mods().len(), 1);
    assert_eq!(net.metrics.write_failures.get(), 1);
    assert_eq!(net.metrics.switch_totals(2), Some((0, 0, 1)));
}

#[test]
fn test_odd_route_is_rejected() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3])).build();
    let route = Route::new(vec![swp(1, 1), swp(1, 2), swp(1, 3)]);
    let pi = packet_in(1);

    let result = net
        .forwarding
        .push_rewrite_route(&route_request(&route, &a, &pi, 1), &PacketContext::default());

    assert!(matches!(result, Err(Error::InvalidRoute(_))));
    assert!(net.switches.write_order().is_empty());
}

#[test]
fn test_same_port_destination_is_noop() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 1)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert!(net.switches.write_order().is_empty());
    assert!(net.switches.injected().is_empty());
}

/// FORWARD to an unknown destination probes for it instead of flooding
#[test]
fn test_unknown_destination_forward_injects_arp_probe() {
    let a = host_a(swp(1, 1));
    let b = host_b(None);
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3])).build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert!(net.switches.write_order().is_empty(), "no flooding");
    let injected = net.switches.injected();
    assert_eq!(injected.len(), 1);
    let (dpid, probe_in) = &injected[0];
    assert_eq!(*dpid, 1);
    assert_eq!(probe_in.in_port, 1);

    let probe = EthernetPacket::parse(&probe_in.data).unwrap();
    assert!(probe.is_broadcast());
    let arp = ArpPacket::parse(&probe.payload).unwrap();
    assert!(arp.is_probe());
    assert_eq!(arp.target_ip, IP_B);
    assert_eq!(net.metrics.arp_probes_injected.get(), 1);
}

#[test]
fn test_unknown_destination_forward_or_flood_floods() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3])).build();
    let ctx = PacketContext::new(
        RoutingDecision::new(RoutingAction::ForwardOrFlood {
            destinations: vec![],
        })
        .with_source(a, swp(1, 1)),
    );

    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    assert!(net.switches.injected().is_empty());
    let packet_outs = net.switches.get(1).packet_outs();
    assert_eq!(packet_outs.len(), 1);
    assert_eq!(packet_outs[0].in_port, 1);
    assert_eq!(packet_outs[0].output_ports(), vec![2, 3]);
}

/// Floods leave through host ports only, never back out the ingress
#[test]
fn test_flood_excludes_ingress_and_link_ports() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1, 2], two_switch_topology()).build();
    let ctx = PacketContext::new(
        RoutingDecision::new(RoutingAction::ForwardOrFlood {
            destinations: vec![],
        })
        .with_source(a, swp(1, 1)),
    );
    let pi = PacketIn::new(1, ipv4_frame(MacAddr::BROADCAST).to_bytes());

    net.forwarding.process_packet_in(1, &pi, &ctx);

    let sw1 = net.switches.get(1).packet_outs();
    assert_eq!(sw1.len(), 1);
    assert_eq!(sw1[0].in_port, 1);
    assert_eq!(sw1[0].output_ports(), vec![2]);

    let sw2 = net.switches.get(2).packet_outs();
    assert_eq!(sw2.len(), 1);
    assert_eq!(sw2[0].in_port, port::NONE);
    assert_eq!(sw2[0].output_ports(), vec![1, 2]);

    // the same broadcast again is suppressed
    net.forwarding.process_packet_in(1, &pi, &ctx);
    assert_eq!(net.switches.get(1).packet_outs().len(), 1);
    assert_eq!(net.metrics.floods_suppressed.get(), 1);

    net.forwarding.set_broadcast_cache(false);
    net.forwarding.process_packet_in(1, &pi, &ctx);
    assert_eq!(net.switches.get(1).packet_outs().len(), 2);
}

#[test]
fn test_flood_includes_broadcast_tree_ports() {
    let a = host_a(swp(1, 1));
    let topology = two_switch_topology().broadcast_port(swp(1, 3));
    let net = NetBuilder::new(&[1, 2], topology).build();
    let ctx = PacketContext::new(
        RoutingDecision::new(RoutingAction::ForwardOrFlood {
            destinations: vec![],
        })
        .with_source(a, swp(1, 1)),
    );

    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    assert_eq!(net.switches.get(1).packet_outs()[0].output_ports(), vec![2, 3]);
}

#[test]
fn test_flood_blocked_by_incoming_broadcast_policy() {
    let a = host_a(swp(1, 1));
    let topology = FakeTopology::new()
        .switch(1, &[1, 2, 3])
        .block_incoming_broadcast(swp(1, 1));
    let net = NetBuilder::new(&[1], topology).build();
    let ctx = PacketContext::new(
        RoutingDecision::new(RoutingAction::ForwardOrFlood {
            destinations: vec![],
        })
        .with_source(a, swp(1, 1)),
    );

    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    assert!(net.switches.write_order().is_empty());
}

/// One packet-out per (switch, egress VLAN)
#[test]
fn test_multicast_groups_ports_by_vlan() {
    let c = Arc::new(
        Device::new(MacAddr::from_u64(0xcc), "default").with_attachment_point(swp(1, 4), &[]),
    );
    let rewrite = PortVlans::new(&[(swp(1, 2), 10), (swp(1, 3), 20), (swp(1, 5), 10)]);
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3, 4, 5]))
        .rewrite(rewrite)
        .build();

    let mut decision = RoutingDecision::new(RoutingAction::Multicast {
        devices: vec![c],
        interfaces: vec![swp(1, 2), swp(1, 3), swp(1, 5), swp(1, 1)],
    });
    decision.source_port = Some(swp(1, 1));
    let ctx = PacketContext::new(decision);
    let pi = PacketIn::new(1, ipv4_frame(MacAddr::from_u64(0x0100_5e00_0001)).to_bytes());

    let cmd = net.forwarding.process_packet_in(1, &pi, &ctx);
    assert_eq!(cmd, Command::Stop);

    let packet_outs = net.switches.get(1).packet_outs();
    assert_eq!(packet_outs.len(), 3);
    let by_vlan: Vec<_> = packet_outs
        .iter()
        .map(|po| {
            let eth = EthernetPacket::parse(&po.data).unwrap();
            assert_eq!(po.in_port, port::NONE);
            (eth.vlan_id(), po.output_ports())
        })
        .collect();
    assert_eq!(
        by_vlan,
        vec![
            (10, vec![2, 5]),
            (20, vec![3]),
            (VLAN_UNTAGGED, vec![4]),
        ]
    );

    // replicated once per window within the ingress L2 domain
    net.forwarding.process_packet_in(1, &pi, &ctx);
    assert_eq!(net.switches.get(1).packet_outs().len(), 3);
}

#[test]
fn test_multicast_drops_truncated_ipv4() {
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();
    let mut decision = RoutingDecision::new(RoutingAction::Multicast {
        devices: vec![],
        interfaces: vec![swp(1, 2)],
    });
    decision.source_port = Some(swp(1, 1));
    let mut data = ipv4_frame(MacAddr::from_u64(0x0100_5e00_0001)).to_bytes();
    data.truncate(data.len() - 4);

    net.forwarding
        .process_packet_in(1, &PacketIn::new(1, data), &PacketContext::new(decision));

    assert_eq!(net.forwarding.truncated_packets_seen(), 1);
    assert!(net.switches.write_order().is_empty());
}

#[test]
fn test_drop_installs_deny_rule() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();
    let ctx = PacketContext::new(
        RoutingDecision::new(RoutingAction::Drop)
            .with_source(a, swp(1, 1))
            .with_hard_timeout(30),
    );

    let cmd = net.forwarding.process_packet_in(1, &packet_in(1), &ctx);
    assert_eq!(cmd, Command::Stop);

    let flow_mods = net.switches.get(1).flow_mods();
    assert_eq!(flow_mods.len(), 1);
    let fm = &flow_mods[0];
    assert_eq!(fm.command, FlowModCommand::Add);
    assert!(fm.actions.is_empty());
    assert_eq!(fm.hard_timeout, 30);
    assert_eq!(fm.idle_timeout, 5);
    assert_eq!(fm.cookie, APP_COOKIE);
    assert_eq!(fm.flags, OFPFF_SEND_FLOW_REM);
    assert!(net.switches.get(1).packet_outs().is_empty());

    let cached = net.flow_cache.get(1, &fm.of_match).expect("deny flow cached");
    assert_eq!(cached.action, FlowAction::Deny);
    assert_eq!(cached.src_port, swp(1, 1));
}

#[test]
fn test_no_decision_continues() {
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();

    let cmd = net
        .forwarding
        .process_packet_in(1, &packet_in(1), &PacketContext::default());
    assert_eq!(cmd, Command::Continue);

    let none = PacketContext::new(RoutingDecision::new(RoutingAction::None));
    assert_eq!(
        net.forwarding.process_packet_in(1, &packet_in(1), &none),
        Command::Continue
    );
    assert!(net.switches.write_order().is_empty());
}

#[test]
fn test_access_priority_reload() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();

    net.forwarding
        .reload_access_priority(&[ForwardingConfigRow::new("forwarding", "25")]);
    assert_eq!(net.forwarding.access_priority(), 25);

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));
    assert_eq!(net.switches.get(1).flow_mods()[0].priority, 25);

    // a removed row falls back to the default
    net.forwarding.reload_access_priority(&[]);
    assert_eq!(net.forwarding.access_priority(), 10);
}

fn installed_match() -> OfMatch {
    OfMatch::from_packet(&packet_in(1).data, 1).unwrap()
}

/// B moved from 1/2 to 1/3: the rule is modified towards the new port
#[test]
fn test_reconcile_after_device_move_modifies_rule() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 3)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3]))
        .devices(&[a, b])
        .build();

    let rc = MatchReconcile::new(1, installed_match(), "default", ReconcileAction::UpdatePath);
    let cmd = net.forwarding.reconcile_flows(&[rc]);
    assert_eq!(cmd, Command::Stop);

    let sw = net.switches.get(1);
    let flow_mods = sw.flow_mods();
    assert_eq!(flow_mods.len(), 1);
    assert_eq!(flow_mods[0].command, FlowModCommand::Modify);
    assert_eq!(flow_mods[0].cookie, APP_COOKIE);
    assert_eq!(flow_mods[0].output_ports(), vec![3]);
    assert!(sw.packet_outs().is_empty(), "no packet to release");
    assert!(sw.flushes() >= 1);
}

#[test]
fn test_reconcile_without_destination_deletes_rule() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2]))
        .devices(&[a])
        .build();

    let rc = MatchReconcile::new(1, installed_match(), "default", ReconcileAction::NewEntry)
        .with_priority(10);
    net.forwarding.reconcile_flows(&[rc]);

    let flow_mods = net.switches.get(1).flow_mods();
    assert_eq!(flow_mods.len(), 1);
    assert_eq!(flow_mods[0].command, FlowModCommand::Delete);
    assert_eq!(flow_mods[0].priority, 10);
    assert_eq!(flow_mods[0].out_port, port::NONE);
}

#[test]
fn test_reconcile_drop_and_delete() {
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();
    let m = installed_match();

    net.forwarding.reconcile_flows(&[
        MatchReconcile::new(1, m, "tenant", ReconcileAction::Drop).with_cookie(77),
        MatchReconcile::new(1, m, "tenant", ReconcileAction::NoChange),
        MatchReconcile::new(9, m, "tenant", ReconcileAction::Delete),
    ]);

    let sw = net.switches.get(1);
    let flow_mods = sw.flow_mods();
    assert_eq!(flow_mods.len(), 1, "unknown switch 9 is skipped");
    assert_eq!(flow_mods[0].command, FlowModCommand::Modify);
    assert_eq!(flow_mods[0].cookie, 77);
    assert_eq!(flow_mods[0].idle_timeout, 5);
    assert!(flow_mods[0].actions.is_empty());
    assert_eq!(sw.flushes(), 1);

    let cached = net.flow_cache.get(1, &m).expect("deny flow cached");
    assert_eq!(cached.action, FlowAction::Deny);
    assert_eq!(cached.app_instance, "tenant");
}

#[test]
fn test_reconcile_app_instance_change() {
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2])).build();
    let m = installed_match();
    net.flow_cache.add_flow(FlowCacheEntry {
        app_instance: "default".into(),
        switch: 1,
        of_match: m,
        cookie: APP_COOKIE,
        src_port: swp(1, 1),
        priority: 10,
        action: FlowAction::Permit,
    });

    net.forwarding.reconcile_flows(&[MatchReconcile::new(
        1,
        m,
        "tenant",
        ReconcileAction::AppInstanceChanged,
    )]);

    assert!(net.switches.write_order().is_empty());
    assert_eq!(net.flow_cache.flows_for_app_instance("tenant").len(), 1);
    assert!(net.flow_cache.flows_for_app_instance("default").is_empty());
}

#[test]
fn test_destination_in_other_island_is_discovered() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let topology = two_switch_topology().island(2, 2);
    let net = NetBuilder::new(&[1, 2], topology).build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert!(net.switches.write_order().is_empty());
    assert_eq!(net.switches.injected().len(), 1);
}

/// Islands {1, 2} and {1, 3}: only island 1 is shared
#[test]
fn test_route_scoped_to_shared_island() {
    let a = Arc::new(
        Device::new(MacAddr::from_u64(MAC_A), "default")
            .with_attachment_point(swp(1, 1), &[VLAN_UNTAGGED])
            .with_attachment_point(swp(3, 1), &[VLAN_UNTAGGED]),
    );
    let b = Arc::new(
        Device::new(MacAddr::from_u64(MAC_B), "default")
            .with_attachment_point(swp(1, 2), &[VLAN_UNTAGGED])
            .with_attachment_point(swp(4, 1), &[VLAN_UNTAGGED]),
    );
    let topology = FakeTopology::new()
        .switch(1, &[1, 2])
        .switch(3, &[1])
        .switch(4, &[1])
        .island(3, 2)
        .island(4, 3);
    let net = NetBuilder::new(&[1, 3, 4], topology).build();

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert_eq!(net.switches.get(1).flow_mods().len(), 1);
    assert!(net.switches.get(3).messages().is_empty());
    assert!(net.switches.get(4).messages().is_empty());
}

/// A moved host: the route starts at 1/1 but the packet came in on 1/4
#[test]
fn test_packet_in_off_route_injects_probes() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3, 4])).build();

    let cmd = net
        .forwarding
        .process_packet_in(1, &packet_in(4), &forward(&a, swp(1, 4), &b));
    assert_eq!(cmd, Command::Stop);

    assert!(net.switches.get(1).flow_mods().is_empty(), "no rules installed");
    assert!(net.switches.write_order().is_empty());

    let injected = net.switches.injected();
    let ports: Vec<_> = injected.iter().map(|(dpid, pi)| (*dpid, pi.in_port)).collect();
    assert_eq!(ports, vec![(1, 1), (1, 4)], "route ingress first, then the packet-in port");
    for (_, pi) in &injected {
        let probe = EthernetPacket::parse(&pi.data).unwrap();
        let arp = ArpPacket::parse(&probe.payload).unwrap();
        assert!(arp.is_probe());
        assert_eq!(arp.target_ip, IP_B);
    }
    assert_eq!(net.metrics.arp_probes_injected.get(), 2);
}

/// Packet-in on switch 2, route starting on switch 1
#[test]
fn test_first_hop_vlan_must_be_unique() {
    let net = NetBuilder::new(&[1, 2], two_switch_topology()).build();
    let route = Route::new(vec![swp(1, 1), swp(1, 2)]);
    let pi = packet_in(1);

    let ambiguous: [&[u16]; 2] = [&[10, 20], &[]];
    for vlans in ambiguous {
        let a = Device::new(MacAddr::from_u64(MAC_A), "default")
            .with_attachment_point(swp(1, 1), vlans);
        let result = net
            .forwarding
            .push_rewrite_route(&route_request(&route, &a, &pi, 2), &PacketContext::default());
        match result {
            Err(Error::AmbiguousVlan { port, .. }) => assert_eq!(port, swp(1, 1)),
            other => panic!("expected AmbiguousVlan, got {:?}", other),
        }
    }
    assert!(net.switches.write_order().is_empty());

    let a = Device::new(MacAddr::from_u64(MAC_A), "default")
        .with_attachment_point(swp(1, 1), &[10]);
    let included = net
        .forwarding
        .push_rewrite_route(&route_request(&route, &a, &pi, 2), &PacketContext::default())
        .unwrap();
    assert!(!included, "packet-in switch is not on the route");

    let flow_mods = net.switches.get(1).flow_mods();
    assert_eq!(flow_mods.len(), 1);
    assert_eq!(flow_mods[0].of_match.dl_vlan, 10);
    assert_eq!(flow_mods[0].actions, vec![Action::output(2)]);
    assert!(net.switches.get(1).packet_outs().is_empty());
}

fn ttl_net() -> Net {
    let attrs = SwitchAttributes {
        supports_ttl_decrement: true,
        ..Default::default()
    };
    NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3]))
        .switch_attributes(1, attrs)
        .build()
}

fn ttl_decrement(n: u32) -> RewriteRule {
    RewriteRule {
        ttl_decrement: Some(n),
        ..Default::default()
    }
}

#[test]
fn test_ttl_decrement_on_first_hop() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = ttl_net();

    let ctx = forward(&a, swp(1, 1), &b).with_rewrite(ttl_decrement(1));
    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    let sw = net.switches.get(1);
    assert_eq!(sw.flow_mods()[0].actions, vec![Action::DecTtl, Action::output(2)]);
    assert_eq!(ttl_of(&sw.packet_outs()[0].data), 63);
}

/// The packet carries TTL 64
#[test]
fn test_expired_ttl_aborts_route() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let net = ttl_net();
    let ctx = forward(&a, swp(1, 1), &b).with_rewrite(ttl_decrement(64));

    let cmd = net.forwarding.process_packet_in(1, &packet_in(1), &ctx);
    assert_eq!(cmd, Command::Stop);
    assert!(net.switches.write_order().is_empty());
    assert_eq!(net.flow_cache.active_count(), 0);

    let route = Route::new(vec![swp(1, 1), swp(1, 2)]);
    let pi = packet_in(1);
    let result = net
        .forwarding
        .push_rewrite_route(&route_request(&route, &a, &pi, 1), &ctx);
    assert!(matches!(result, Err(Error::TtlExpired)));
    assert!(net.switches.write_order().is_empty());
}

#[test]
fn test_expired_ttl_aborts_flood() {
    let a = host_a(swp(1, 1));
    let net = ttl_net();
    let flood = |rewrite| {
        PacketContext::new(
            RoutingDecision::new(RoutingAction::ForwardOrFlood {
                destinations: vec![],
            })
            .with_source(a.clone(), swp(1, 1)),
        )
        .with_rewrite(rewrite)
    };

    net.forwarding
        .process_packet_in(1, &packet_in(1), &flood(ttl_decrement(64)));
    assert!(net.switches.write_order().is_empty());

    net.forwarding.set_broadcast_cache(false);
    net.forwarding
        .process_packet_in(1, &packet_in(1), &flood(ttl_decrement(1)));
    let packet_outs = net.switches.get(1).packet_outs();
    assert_eq!(packet_outs.len(), 1);
    assert_eq!(packet_outs[0].output_ports(), vec![2, 3]);
    assert_eq!(ttl_of(&packet_outs[0].data), 63);
}

/// Switches 1 and 2 joined by a tunnel on port 9
fn tunnel_net(tunnels: FakeTunnels) -> Net {
    let topology = FakeTopology::new()
        .switch(1, &[1, 9])
        .switch(2, &[2, 9])
        .link(swp(1, 9), swp(2, 9));
    let routing = FakeRouting::new().with_route(&[swp(1, 1), swp(1, 9), swp(2, 9), swp(2, 2)]);
    NetBuilder::new(&[1, 2], topology)
        .routing(routing)
        .tunnels(tunnels)
        .build()
}

#[test]
fn test_tunnel_egress_sets_tunnel_destination() {
    let tunnel_ip = Ipv4Addr::new(192, 168, 0, 2);
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let net = tunnel_net(
        FakeTunnels::new()
            .tunnel_port(swp(1, 9))
            .tunnel_port(swp(2, 9))
            .tunnel_ip(2, tunnel_ip),
    );

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    let ingress = net.switches.get(1).flow_mods().remove(0);
    assert_eq!(
        ingress.actions,
        vec![Action::SetTunnelDst(tunnel_ip), Action::output(9)]
    );
    let bytes = OfMessage::from(ingress).to_bytes(0).unwrap();
    assert_eq!(
        &bytes[72..88],
        &[
            0xff, 0xff, 0x00, 0x10, // vendor action, 16 bytes
            0x00, 0x5c, 0x16, 0xc7, // Big Switch
            0x00, 0x00, 0x00, 0x02, // set tunnel destination
            192, 168, 0, 2,
        ]
    );

    // the rule leaving the tunnel carries no tunnel action
    let egress = net.switches.get(2).flow_mods().remove(0);
    assert_eq!(egress.actions, vec![Action::output(2)]);

    let packet_out = net.switches.get(1).packet_outs().remove(0);
    assert_eq!(
        packet_out.actions,
        vec![Action::SetTunnelDst(tunnel_ip), Action::output(9)]
    );
}

#[test]
fn test_tunnel_without_address_aborts_route() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let net = tunnel_net(FakeTunnels::new().tunnel_port(swp(1, 9)));

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));
    assert!(net.switches.write_order().is_empty());

    let route = Route::new(vec![swp(1, 1), swp(1, 9), swp(2, 9), swp(2, 2)]);
    let pi = packet_in(1);
    let result = net
        .forwarding
        .push_rewrite_route(&route_request(&route, &a, &pi, 1), &PacketContext::default());
    assert!(matches!(result, Err(Error::Tunnel(_))));
}

/// Only the switch-to-switch route is known; the port-to-port query fails
#[test]
fn test_tunnel_endpoint_destination_routes_through_cluster() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let orig = Arc::new(
        Device::new(MacAddr::from_u64(0xdd), "default")
            .with_attachment_point(swp(1, 5), &[VLAN_UNTAGGED]),
    );
    let build = |tunnels: FakeTunnels| {
        let routing =
            FakeRouting::new().with_route(&[swp(1, 7), swp(1, 3), swp(2, 3), swp(2, 8)]);
        NetBuilder::new(&[1, 2], two_switch_topology())
            .routing(routing)
            .tunnels(tunnels)
            .build()
    };
    let ctx = forward(&a, swp(1, 1), &b).with_orig_dst_device(orig.clone());

    // not a tunnel endpoint: the original destination is ignored
    let net = build(FakeTunnels::new());
    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);
    assert!(net.switches.write_order().is_empty());

    let net = build(FakeTunnels::new().endpoint(orig.mac));
    net.forwarding.process_packet_in(1, &packet_in(1), &ctx);

    let ingress = net.switches.get(1).flow_mods().remove(0);
    assert_eq!(ingress.of_match.in_port, 1);
    assert_eq!(ingress.output_ports(), vec![3]);
    let egress = net.switches.get(2).flow_mods().remove(0);
    assert_eq!(egress.of_match.in_port, 3);
    assert_eq!(egress.output_ports(), vec![2]);
    assert_eq!(net.switches.get(1).packet_outs().len(), 1);
}

fn loopback_net(tunnels: FakeTunnels, route: &[SwitchPort]) -> Net {
    let topology = FakeTopology::new()
        .switch(1, &[1, 3, 6])
        .switch(2, &[2, 3, 6])
        .link(swp(1, 3), swp(2, 3));
    NetBuilder::new(&[1, 2], topology)
        .routing(FakeRouting::new().with_route(route))
        .tunnels(tunnels)
        .build()
}

#[test]
fn test_route_from_loopback_reports_tunnel_source() {
    let a = host_a(swp(1, 6));
    let b = host_b(Some(swp(2, 2)));
    let net = loopback_net(
        FakeTunnels::new().loopback_port(swp(1, 6)).tunnel_ip(2, IP_B),
        &[swp(1, 6), swp(1, 3), swp(2, 3), swp(2, 2)],
    );

    net.forwarding
        .process_packet_in(1, &packet_in(6), &forward(&a, swp(1, 6), &b));

    assert_eq!(
        net.topology.detected(),
        vec![TunnelDetection::Source {
            first: 1,
            dst_switch: 2
        }]
    );
    assert_eq!(net.switches.get(1).flow_mods().len(), 1);
    assert_eq!(net.switches.get(2).flow_mods().len(), 1);
}

#[test]
fn test_route_to_loopback_reports_tunnel_destination() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 6)));
    let net = loopback_net(
        FakeTunnels::new().loopback_port(swp(2, 6)).tunnel_ip(1, IP_A),
        &[swp(1, 1), swp(1, 3), swp(2, 3), swp(2, 6)],
    );

    net.forwarding
        .process_packet_in(1, &packet_in(1), &forward(&a, swp(1, 1), &b));

    assert_eq!(
        net.topology.detected(),
        vec![TunnelDetection::Destination {
            src_switch: 1,
            last: 2
        }]
    );
}

#[test]
fn test_unavailable_switch_aborts_route() {
    let a = host_a(swp(1, 1));
    let net = NetBuilder::new(&[1, 2], two_switch_topology()).build();
    net.switches.disconnect(2);
    let route = Route::new(vec![swp(1, 1), swp(1, 3), swp(2, 3), swp(2, 2)]);
    let pi = packet_in(1);

    let result = net
        .forwarding
        .push_rewrite_route(&route_request(&route, &a, &pi, 1), &PacketContext::default());

    assert!(matches!(result, Err(Error::SwitchUnavailable(2))));
    assert!(net.switches.write_order().is_empty(), "nothing written upstream either");
    assert_eq!(net.flow_cache.active_count(), 0);
}

fn assert_reconciled_delete(net: &Net, priority: u16) {
    let sw = net.switches.get(1);
    let flow_mods = sw.flow_mods();
    assert_eq!(flow_mods.len(), 1);
    let fm = &flow_mods[0];
    assert_eq!(fm.command, FlowModCommand::Delete);
    assert_eq!(fm.of_match, installed_match());
    assert_eq!(fm.cookie, APP_COOKIE);
    assert_eq!(fm.priority, priority);
    assert_eq!(fm.out_port, port::NONE);
    assert_eq!(sw.flushes(), 1);
}

/// The flow enters at 1/1 but A is now attached at 1/4
#[test]
fn test_reconcile_ingress_moved_deletes_rule() {
    let a = host_a(swp(1, 4));
    let b = host_b(Some(swp(1, 2)));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2, 3, 4]))
        .devices(&[a, b])
        .build();

    let rc = MatchReconcile::new(1, installed_match(), "default", ReconcileAction::UpdatePath)
        .with_priority(10);
    net.forwarding.reconcile_flows(&[rc]);

    assert_reconciled_delete(&net, 10);
}

#[test]
fn test_reconcile_unroutable_in_own_island_deletes_rule() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(2, 2)));
    let net = NetBuilder::new(&[1, 2], two_switch_topology())
        .devices(&[a, b])
        .build();

    let rc = MatchReconcile::new(1, installed_match(), "default", ReconcileAction::UpdatePath)
        .with_priority(12);
    net.forwarding.reconcile_flows(&[rc]);

    assert_reconciled_delete(&net, 12);
    assert!(net.switches.get(2).messages().is_empty());
}

#[test]
fn test_reconcile_unattached_tunnel_destination_deletes_rule() {
    let a = host_a(swp(1, 1));
    let b = host_b(Some(swp(1, 2)));
    let orig = Arc::new(Device::new(MacAddr::from_u64(0xdd), "default"));
    let net = NetBuilder::new(&[1], FakeTopology::new().switch(1, &[1, 2]))
        .devices(&[a, b])
        .tunnels(FakeTunnels::new().endpoint(orig.mac))
        .build();

    let ctx = PacketContext::default().with_orig_dst_device(orig);
    let rc = MatchReconcile::new(1, installed_match(), "default", ReconcileAction::UpdatePath)
        .with_priority(10)
        .with_context(ctx);
    net.forwarding.reconcile_flows(&[rc]);

    assert_reconciled_delete(&net, 10);
}
