//! OpenFlow 1.0 match (`ofp_match`)

use super::PortNo;
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::EthernetPacket;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::{EtherType, MacAddr, VLAN_UNTAGGED};
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Encoded size of `ofp_match`
pub const MATCH_LEN: usize = 40;

/// Wildcard bits
pub mod wildcards {
    pub const IN_PORT: u32 = 1 << 0;
    pub const DL_VLAN: u32 = 1 << 1;
    pub const DL_SRC: u32 = 1 << 2;
    pub const DL_DST: u32 = 1 << 3;
    pub const DL_TYPE: u32 = 1 << 4;
    pub const NW_PROTO: u32 = 1 << 5;
    pub const TP_SRC: u32 = 1 << 6;
    pub const TP_DST: u32 = 1 << 7;
    pub const NW_SRC_SHIFT: u32 = 8;
    pub const NW_SRC_MASK: u32 = 0x3f << NW_SRC_SHIFT;
    pub const NW_SRC_ALL: u32 = 32 << NW_SRC_SHIFT;
    pub const NW_DST_SHIFT: u32 = 14;
    pub const NW_DST_MASK: u32 = 0x3f << NW_DST_SHIFT;
    pub const NW_DST_ALL: u32 = 32 << NW_DST_SHIFT;
    pub const DL_VLAN_PCP: u32 = 1 << 20;
    pub const NW_TOS: u32 = 1 << 21;
    pub const ALL: u32 = (1 << 22) - 1;
}

const IP_PROTO_ICMP: u8 = 1;
const IP_PROTO_TCP: u8 = 6;
const IP_PROTO_UDP: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfMatch {
    pub wildcards: u32,
    pub in_port: PortNo,
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Default for OfMatch {
    /// Match-all
    fn default() -> Self {
        Self {
            wildcards: wildcards::ALL,
            in_port: 0,
            dl_src: MacAddr::ZERO,
            dl_dst: MacAddr::ZERO,
            dl_vlan: VLAN_UNTAGGED,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

impl OfMatch {
    /// Exact match on every field the packet carries
    pub fn from_packet(data: &[u8], in_port: PortNo) -> Result<Self> {
        let eth = EthernetPacket::parse(data)?;
        Ok(Self::from_ethernet(&eth, in_port))
    }

    pub fn from_ethernet(eth: &EthernetPacket, in_port: PortNo) -> Self {
        let mut m = Self {
            wildcards: 0,
            in_port,
            dl_src: eth.src_mac,
            dl_dst: eth.dst_mac,
            dl_vlan: eth.vlan_id(),
            dl_vlan_pcp: eth.priority_code(),
            dl_type: eth.ethertype,
            ..Self::default()
        };

        if eth.ethertype == EtherType::Ipv4 as u16 {
            if let Ok(ip) = Ipv4Header::parse(&eth.payload) {
                m.nw_tos = eth.payload[1] & 0xfc;
                m.nw_proto = ip.protocol();
                m.nw_src = ip.src_addr();
                m.nw_dst = ip.dst_addr();
                let l4 = &eth.payload[ip.header_len()..];
                match ip.protocol() {
                    IP_PROTO_TCP | IP_PROTO_UDP if l4.len() >= 4 => {
                        m.tp_src = u16::from_be_bytes([l4[0], l4[1]]);
                        m.tp_dst = u16::from_be_bytes([l4[2], l4[3]]);
                    }
                    IP_PROTO_ICMP if l4.len() >= 2 => {
                        m.tp_src = l4[0] as u16;
                        m.tp_dst = l4[1] as u16;
                    }
                    _ => {}
                }
            }
        } else if eth.ethertype == EtherType::Arp as u16 {
            if let Ok(arp) = ArpPacket::parse(&eth.payload) {
                m.nw_proto = (arp.operation as u16 & 0xff) as u8;
                m.nw_src = arp.sender_ip;
                m.nw_dst = arp.target_ip;
            }
        }
        m
    }

    pub fn with_in_port(mut self, in_port: PortNo) -> Self {
        self.in_port = in_port;
        self
    }

    pub fn with_wildcards(mut self, wildcards: u32) -> Self {
        self.wildcards = wildcards;
        self
    }

    pub fn is_arp(&self) -> bool {
        self.dl_type == EtherType::Arp as u16
    }

    pub fn to_bytes(&self) -> [u8; MATCH_LEN] {
        let mut buf = [0u8; MATCH_LEN];
        buf[0..4].copy_from_slice(&self.wildcards.to_be_bytes());
        buf[4..6].copy_from_slice(&self.in_port.to_be_bytes());
        buf[6..12].copy_from_slice(&self.dl_src.0);
        buf[12..18].copy_from_slice(&self.dl_dst.0);
        buf[18..20].copy_from_slice(&self.dl_vlan.to_be_bytes());
        buf[20] = self.dl_vlan_pcp;
        buf[22..24].copy_from_slice(&self.dl_type.to_be_bytes());
        buf[24] = self.nw_tos;
        buf[25] = self.nw_proto;
        buf[28..32].copy_from_slice(&self.nw_src.octets());
        buf[32..36].copy_from_slice(&self.nw_dst.octets());
        buf[36..38].copy_from_slice(&self.tp_src.to_be_bytes());
        buf[38..40].copy_from_slice(&self.tp_dst.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < MATCH_LEN {
            return Err(Error::Parse("ofp_match too short".into()));
        }
        let be16 = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);
        let mac = |at: usize| {
            let mut octets = [0u8; 6];
            octets.copy_from_slice(&buf[at..at + 6]);
            MacAddr(octets)
        };
        let ip = |at: usize| Ipv4Addr::new(buf[at], buf[at + 1], buf[at + 2], buf[at + 3]);

        Ok(Self {
            wildcards: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            in_port: be16(4),
            dl_src: mac(6),
            dl_dst: mac(12),
            dl_vlan: be16(18),
            dl_vlan_pcp: buf[20],
            dl_type: be16(22),
            nw_tos: buf[24],
            nw_proto: buf[25],
            nw_src: ip(28),
            nw_dst: ip(32),
            tp_src: be16(36),
            tp_dst: be16(38),
        })
    }
}

impl fmt::Display for OfMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OfMatch[in_port={},dl_src={},dl_dst={},dl_vlan={:#06x},dl_type={:#06x},nw_src={},nw_dst={},wildcards={:#x}]",
            self.in_port,
            self.dl_src,
            self.dl_dst,
            self.dl_vlan,
            self.dl_type,
            self.nw_src,
            self.nw_dst,
            self.wildcards
        )
    }
}
