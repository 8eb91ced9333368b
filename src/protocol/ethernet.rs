//! Ethernet frame parsing and construction

use super::ipv4::{Ipv4Header, Ipv4Packet};
use super::{EtherType, MacAddr, VlanTag, VLAN_UNTAGGED};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum Ethernet frame size (without FCS)
pub const MIN_FRAME_SIZE: usize = 14;
/// Maximum Ethernet frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    vlan_tag: Option<VlanTag>,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_FRAME_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        let ethertype = u16::from_be_bytes([buffer[12], buffer[13]]);
        let (vlan_tag, payload_offset) = if ethertype == EtherType::Vlan as u16 {
            if buffer.len() < 18 {
                return Err(Error::Parse("VLAN frame too short".into()));
            }
            (Some(VlanTag::from_bytes([buffer[14], buffer[15]])), 18)
        } else {
            (None, 14)
        };

        Ok(Self {
            buffer,
            vlan_tag,
            payload_offset,
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[0..6]);
        MacAddr(mac)
    }

    pub fn src_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[6..12]);
        MacAddr(mac)
    }

    /// EtherType of the payload (inner type for tagged frames)
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..]
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned, mutable Ethernet frame.
///
/// The compiler and the flood/multicast handlers rewrite headers on a copy
/// of the triggering packet, so unlike [`Frame`] this owns its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetPacket {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub vlan: Option<VlanTag>,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl EthernetPacket {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let frame = Frame::parse(buffer)?;
        Ok(Self {
            dst_mac: frame.dst_mac(),
            src_mac: frame.src_mac(),
            vlan: frame.vlan_tag(),
            ethertype: frame.ethertype(),
            payload: frame.payload().to_vec(),
        })
    }

    /// Header-only frame, used when a rule is recompiled without a packet
    pub fn header_only(dst_mac: MacAddr, src_mac: MacAddr, vlan_id: u16, ethertype: u16) -> Self {
        let mut eth = Self {
            dst_mac,
            src_mac,
            vlan: None,
            ethertype,
            payload: Vec::new(),
        };
        eth.set_vlan_id(vlan_id);
        eth
    }

    /// VLAN id, or [`VLAN_UNTAGGED`]
    pub fn vlan_id(&self) -> u16 {
        self.vlan.map(|tag| tag.vid).unwrap_or(VLAN_UNTAGGED)
    }

    /// Set the VLAN id; [`VLAN_UNTAGGED`] strips the tag. The priority code
    /// of an existing tag is kept.
    pub fn set_vlan_id(&mut self, vid: u16) {
        if vid == VLAN_UNTAGGED {
            self.vlan = None;
            return;
        }
        let pcp = self.priority_code();
        let mut tag = VlanTag::new(vid);
        tag.pcp = pcp;
        self.vlan = Some(tag);
    }

    pub fn priority_code(&self) -> u8 {
        self.vlan.map(|tag| tag.pcp).unwrap_or(0)
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst_mac.is_broadcast()
    }

    pub fn is_ipv4(&self) -> bool {
        self.ethertype == EtherType::Ipv4 as u16 && Ipv4Header::parse(&self.payload).is_ok()
    }

    /// Source and destination of an IPv4 payload
    pub fn ipv4_addrs(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        if self.ethertype != EtherType::Ipv4 as u16 {
            return None;
        }
        let header = Ipv4Header::parse(&self.payload).ok()?;
        Some((header.src_addr(), header.dst_addr()))
    }

    /// IPv4 packet whose total length exceeds the captured bytes
    pub fn is_truncated_ipv4(&self) -> bool {
        if self.ethertype != EtherType::Ipv4 as u16 {
            return false;
        }
        match Ipv4Header::parse(&self.payload) {
            Ok(header) => header.total_length() as usize > self.payload.len(),
            Err(_) => false,
        }
    }

    /// Decrement the IPv4 TTL by `n` (capped at 255).
    ///
    /// Returns false when the TTL expired, leaving it at 0, or when the
    /// IPv4 header cannot be read. Non-IPv4 frames are untouched and
    /// return true.
    pub fn decrement_ttl(&mut self, n: u32) -> bool {
        if self.ethertype != EtherType::Ipv4 as u16 {
            return true;
        }
        let Ok(mut packet) = Ipv4Packet::from_bytes(&self.payload) else {
            return false;
        };
        let alive = packet.decrement_ttl_by(n.min(255) as u8);
        self.payload = packet.into_bytes();
        alive
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut builder = FrameBuilder::new().dst_mac(self.dst_mac).src_mac(self.src_mac);
        if let Some(tag) = self.vlan {
            builder = builder.vlan_tag(tag);
        }
        builder.ethertype(self.ethertype).payload(&self.payload).build()
    }
}
