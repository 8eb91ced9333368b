//! Metrics collection for forwarding activity.
//!
//! Thread-safe counters for the messages the forwarding core writes,
//! globally and per switch.

use crate::openflow::DatapathId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-switch statistics.
#[derive(Debug, Default)]
pub struct SwitchStats {
    pub flow_mods: Counter,
    pub packet_outs: Counter,
    pub write_errors: Counter,
}

/// Kind of message written to a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    FlowMod,
    PacketOut,
}

/// Global metrics registry for the forwarding core.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    switches: RwLock<HashMap<DatapathId, SwitchStats>>,

    // Switch writes
    pub flow_mods_written: Counter,
    pub packet_outs_written: Counter,
    pub write_failures: Counter,
    pub flushes: Counter,

    // Discovery
    /// Synthetic ARP probes fed back as packet-ins
    pub arp_probes_injected: Counter,

    // Replication
    /// IPv4 packets shorter than their header claims
    pub truncated_packets_seen: Counter,
    /// Floods skipped because the packet was seen recently
    pub floods_suppressed: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful write to `switch`.
    pub fn record_write(&self, switch: DatapathId, kind: WriteKind) {
        match kind {
            WriteKind::FlowMod => self.flow_mods_written.inc(),
            WriteKind::PacketOut => self.packet_outs_written.inc(),
        }
        self.with_switch(switch, |stats| match kind {
            WriteKind::FlowMod => stats.flow_mods.inc(),
            WriteKind::PacketOut => stats.packet_outs.inc(),
        });
    }

    /// Records a failed write to `switch`.
    pub fn record_write_error(&self, switch: DatapathId) {
        self.write_failures.inc();
        self.with_switch(switch, |stats| stats.write_errors.inc());
    }

    fn with_switch(&self, switch: DatapathId, f: impl FnOnce(&SwitchStats)) {
        if let Ok(switches) = self.switches.read() {
            if let Some(stats) = switches.get(&switch) {
                f(stats);
                return;
            }
        }
        if let Ok(mut switches) = self.switches.write() {
            f(switches.entry(switch).or_default());
        }
    }

    /// (flow-mods, packet-outs, write errors) recorded for one switch
    pub fn switch_totals(&self, switch: DatapathId) -> Option<(u64, u64, u64)> {
        let switches = self.switches.read().ok()?;
        switches.get(&switch).map(|stats| {
            (
                stats.flow_mods.get(),
                stats.packet_outs.get(),
                stats.write_errors.get(),
            )
        })
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("flow_mods_written".into(), self.flow_mods_written.get()),
            ("packet_outs_written".into(), self.packet_outs_written.get()),
            ("write_failures".into(), self.write_failures.get()),
            ("flushes".into(), self.flushes.get()),
            ("arp_probes_injected".into(), self.arp_probes_injected.get()),
            (
                "truncated_packets_seen".into(),
                self.truncated_packets_seen.get(),
            ),
            ("floods_suppressed".into(), self.floods_suppressed.get()),
        ];

        if let Ok(switches) = self.switches.read() {
            let mut dpids: Vec<_> = switches.keys().copied().collect();
            dpids.sort_unstable();
            for dpid in dpids {
                let stats = &switches[&dpid];
                result.extend([
                    (format!("switch_{:016x}_flow_mods", dpid), stats.flow_mods.get()),
                    (
                        format!("switch_{:016x}_packet_outs", dpid),
                        stats.packet_outs.get(),
                    ),
                    (
                        format!("switch_{:016x}_write_errors", dpid),
                        stats.write_errors.get(),
                    ),
                ]);
            }
        }

        result
    }
}
