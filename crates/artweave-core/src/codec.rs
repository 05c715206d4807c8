//! Art-Net datagram encoding/decoding
//!
//! Datagram layout:
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Bytes 0-7:  "Art-Net\0"                                  │
//! │ Bytes 8-9:  Opcode (uint16 little-endian)                │
//! │ Bytes 10..: Opcode-specific payload                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol is little-endian with two historical exceptions: IPv4
//! addresses travel as 4 network-order bytes, and the DMX channel-count is
//! big-endian. Both quirks stay inside this module; decoded structs carry
//! host integers and [`Ipv4Addr`] only.

use crate::opcode;
use crate::{Error, Result};
use crate::{ARTNET_PORT, ARTNET_PREFIX, PROTOCOL_VERSION};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Size of the prefix + opcode header.
const HEADER_SIZE: usize = 10;

/// Payload bytes of an ArtPoll.
const POLL_PAYLOAD: usize = 4;

/// Mandatory poll-reply payload: everything through the MAC field.
const REPLY_MANDATORY: usize = 197;

/// Full poll-reply payload as emitted by this implementation.
const REPLY_PAYLOAD: usize = 229;

/// Mandatory ArtDmx payload before the channel data.
const DMX_HEADER: usize = 8;

/// A decoded Art-Net datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtPacket {
    Poll(ArtPoll),
    PollReply(ArtPollReply),
    Dmx(ArtDmx),
}

/// Decode a datagram, dispatching on the opcode.
///
/// Returns [`Error::UnknownOpcode`] for opcodes outside the supported set;
/// callers are expected to log and drop those.
pub fn decode(data: &[u8]) -> Result<ArtPacket> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Truncated {
            needed: HEADER_SIZE,
            have: data.len(),
        });
    }
    if &data[..8] != ARTNET_PREFIX {
        return Err(Error::InvalidPrefix);
    }
    let op = u16::from_le_bytes([data[8], data[9]]);
    let payload = &data[HEADER_SIZE..];
    match op {
        opcode::POLL => Ok(ArtPacket::Poll(ArtPoll::decode(payload)?)),
        opcode::POLL_REPLY => Ok(ArtPacket::PollReply(ArtPollReply::decode(payload)?)),
        opcode::DMX => Ok(ArtPacket::Dmx(ArtDmx::decode(payload)?)),
        other => Err(Error::UnknownOpcode(other)),
    }
}

fn header(capacity: usize, op: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_slice(ARTNET_PREFIX);
    buf.put_u16_le(op);
    buf
}

/// ArtPoll: broadcast by peers to solicit one ArtPollReply per bind page
/// from every node on the subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtPoll {
    /// Protocol revision (big-endian on the wire).
    pub version: u16,
    /// TalkToMe flags.
    pub flags: u8,
    /// Diagnostic priority.
    pub priority: u8,
}

impl Default for ArtPoll {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: 0x02,
            priority: 0x10,
        }
    }
}

impl ArtPoll {
    /// Encode to a complete 14-byte datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = header(HEADER_SIZE + POLL_PAYLOAD, opcode::POLL);
        buf.put_u16(self.version);
        buf.put_u8(self.flags);
        buf.put_u8(self.priority);
        buf.freeze()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < POLL_PAYLOAD {
            return Err(Error::Truncated {
                needed: HEADER_SIZE + POLL_PAYLOAD,
                have: HEADER_SIZE + payload.len(),
            });
        }
        let mut buf = payload;
        Ok(Self {
            version: buf.get_u16(),
            flags: buf.get_u8(),
            priority: buf.get_u8(),
        })
    }
}

/// ArtPollReply: a node describing itself and one page (bind index) of up
/// to four ports.
///
/// Everything through `mac` is mandatory; the trailing fields only exist on
/// the wire if the sender included them, and decode to zero otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtPollReply {
    /// Node IPv4 address (4 network-order bytes on the wire).
    pub ip: Ipv4Addr,
    /// UDP port the node listens on, normally 6454.
    pub udp_port: u16,
    /// Firmware revision.
    pub firmware: u16,
    /// Upper 7 bits of the page's port-addresses.
    pub net_switch: u8,
    /// Middle 4 bits of the page's port-addresses.
    pub sub_switch: u8,
    /// OEM code (vendor/model).
    pub oem: u16,
    /// User Bios Extension Area revision.
    pub ubea: u8,
    /// General status register.
    pub status1: u8,
    /// ESTA manufacturer code.
    pub esta: u16,
    /// Short node name, at most 17 characters (18-byte NUL-padded field).
    pub port_name: String,
    /// Long node name, at most 63 characters.
    pub long_name: String,
    /// Textual status report, `#xxxx [yyyy] zzz…` by convention.
    pub node_report: String,
    /// Declared port count; ports are derived from `port_types` bits, so
    /// receivers may ignore this.
    pub num_ports: u16,
    /// Per-slot direction (bit 7 output, bit 6 input) and media kind (low 5
    /// bits).
    pub port_types: [u8; 4],
    /// Per-slot input status.
    pub good_input: [u8; 4],
    /// Per-slot output status.
    pub good_output: [u8; 4],
    /// Low port-address nibble per input slot.
    pub sw_in: [u8; 4],
    /// Low port-address nibble per output slot.
    pub sw_out: [u8; 4],
    /// sACN priority.
    pub acn_priority: u8,
    /// Macro key inputs.
    pub sw_macro: u8,
    /// Remote trigger inputs.
    pub sw_remote: u8,
    /// Equipment style code.
    pub style: u8,
    /// Node MAC address, zero when unknown.
    pub mac: [u8; 6],
    /// Root-device IP for modular products (optional on the wire).
    pub bind_ip: Ipv4Addr,
    /// 1-based page index; 0 when the sender predates paging.
    pub bind_index: u8,
    /// Status register 2 (bit 3: 15-bit port-addresses supported).
    pub status2: u8,
    /// sACN/merge status per output slot.
    pub good_output_b: [u8; 4],
    /// Status register 3.
    pub status3: u8,
    /// RDMnet default responder UID.
    pub default_resp_uid: [u8; 6],
    /// User-defined spare.
    pub user: u16,
    /// Maximum refresh rate in Hz.
    pub refresh_rate: u16,
}

impl Default for ArtPollReply {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            udp_port: ARTNET_PORT,
            firmware: 0,
            net_switch: 0,
            sub_switch: 0,
            oem: 0,
            ubea: 0,
            status1: 0,
            esta: 0,
            port_name: String::new(),
            long_name: String::new(),
            node_report: String::new(),
            num_ports: 0,
            port_types: [0; 4],
            good_input: [0; 4],
            good_output: [0; 4],
            sw_in: [0; 4],
            sw_out: [0; 4],
            acn_priority: 0,
            sw_macro: 0,
            sw_remote: 0,
            style: 0,
            mac: [0; 6],
            bind_ip: Ipv4Addr::UNSPECIFIED,
            bind_index: 0,
            status2: 0,
            good_output_b: [0; 4],
            status3: 0,
            default_resp_uid: [0; 6],
            user: 0,
            refresh_rate: 0,
        }
    }
}

impl ArtPollReply {
    /// Encode to a complete 239-byte datagram (mandatory region plus the
    /// full optional tail, reserved gaps zeroed).
    pub fn encode(&self) -> Bytes {
        let mut buf = header(HEADER_SIZE + REPLY_PAYLOAD, opcode::POLL_REPLY);
        buf.put_slice(&self.ip.octets());
        buf.put_u16_le(self.udp_port);
        buf.put_u16_le(self.firmware);
        buf.put_u8(self.net_switch);
        buf.put_u8(self.sub_switch);
        buf.put_u16_le(self.oem);
        buf.put_u8(self.ubea);
        buf.put_u8(self.status1);
        buf.put_u16_le(self.esta);
        put_padded(&mut buf, &self.port_name, 18);
        put_padded(&mut buf, &self.long_name, 64);
        put_padded(&mut buf, &self.node_report, 64);
        buf.put_u16_le(self.num_ports);
        buf.put_slice(&self.port_types);
        buf.put_slice(&self.good_input);
        buf.put_slice(&self.good_output);
        buf.put_slice(&self.sw_in);
        buf.put_slice(&self.sw_out);
        buf.put_u8(self.acn_priority);
        buf.put_u8(self.sw_macro);
        buf.put_u8(self.sw_remote);
        buf.put_bytes(0, 3);
        buf.put_u8(self.style);
        buf.put_slice(&self.mac);
        // optional tail, always emitted in full
        buf.put_slice(&self.bind_ip.octets());
        buf.put_u8(self.bind_index);
        buf.put_u8(self.status2);
        buf.put_slice(&self.good_output_b);
        buf.put_u8(self.status3);
        buf.put_bytes(0, 2);
        buf.put_slice(&self.default_resp_uid);
        buf.put_u16_le(self.user);
        buf.put_u16_le(self.refresh_rate);
        buf.put_bytes(0, REPLY_PAYLOAD - 220);
        buf.freeze()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < REPLY_MANDATORY {
            return Err(Error::Truncated {
                needed: HEADER_SIZE + REPLY_MANDATORY,
                have: HEADER_SIZE + payload.len(),
            });
        }
        let len = payload.len();
        let mut buf = payload;

        let mut reply = Self::default();
        let mut ip = [0u8; 4];
        buf.copy_to_slice(&mut ip);
        reply.ip = Ipv4Addr::from(ip);
        reply.udp_port = buf.get_u16_le();
        reply.firmware = buf.get_u16_le();
        reply.net_switch = buf.get_u8();
        reply.sub_switch = buf.get_u8();
        reply.oem = buf.get_u16_le();
        reply.ubea = buf.get_u8();
        reply.status1 = buf.get_u8();
        reply.esta = buf.get_u16_le();
        reply.port_name = take_str(&mut buf, 18);
        reply.long_name = take_str(&mut buf, 64);
        reply.node_report = take_str(&mut buf, 64);
        reply.num_ports = buf.get_u16_le();
        buf.copy_to_slice(&mut reply.port_types);
        buf.copy_to_slice(&mut reply.good_input);
        buf.copy_to_slice(&mut reply.good_output);
        buf.copy_to_slice(&mut reply.sw_in);
        buf.copy_to_slice(&mut reply.sw_out);
        reply.acn_priority = buf.get_u8();
        reply.sw_macro = buf.get_u8();
        reply.sw_remote = buf.get_u8();
        buf.advance(3);
        reply.style = buf.get_u8();
        buf.copy_to_slice(&mut reply.mac);

        // Fields past the MAC exist only if the sender included them; parse
        // field at a time against the received length.
        if len >= 201 {
            let mut bind_ip = [0u8; 4];
            buf.copy_to_slice(&mut bind_ip);
            reply.bind_ip = Ipv4Addr::from(bind_ip);
        }
        if len >= 202 {
            reply.bind_index = buf.get_u8();
        }
        if len >= 203 {
            reply.status2 = buf.get_u8();
        }
        if len >= 207 {
            buf.copy_to_slice(&mut reply.good_output_b);
        }
        if len >= 208 {
            reply.status3 = buf.get_u8();
        }
        if len >= 216 {
            buf.advance(2);
            buf.copy_to_slice(&mut reply.default_resp_uid);
        }
        if len >= 218 {
            reply.user = buf.get_u16_le();
        }
        if len >= 220 {
            reply.refresh_rate = buf.get_u16_le();
        }
        Ok(reply)
    }
}

/// ArtDmx: one frame of channel data for a single universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtDmx {
    /// Protocol revision (big-endian on the wire).
    pub version: u16,
    /// 0 = sender does not sequence; otherwise wraps within 1..=255.
    pub sequence: u8,
    /// Physical input port the data originated from.
    pub physical: u8,
    /// Low 8 bits of the port-address.
    pub sub_uni: u8,
    /// High 7 bits of the port-address.
    pub net: u8,
    /// Channel data; the declared channel-count is its length.
    pub data: Bytes,
}

impl ArtDmx {
    /// Build a frame addressed to `address` carrying `data`.
    pub fn new(address: crate::PortAddress, sequence: u8, physical: u8, data: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            physical,
            sub_uni: (address.raw() & 0xFF) as u8,
            net: address.net(),
            data,
        }
    }

    /// The 15-bit port-address this frame targets, when representable.
    pub fn port_address(&self) -> Result<crate::PortAddress> {
        crate::PortAddress::new(((self.net as u16) << 8) | self.sub_uni as u16)
    }

    /// Encode to a complete datagram. Channel-count is the data length and
    /// travels big-endian, the protocol's second endianness exception.
    pub fn encode(&self) -> Bytes {
        let mut buf = header(HEADER_SIZE + DMX_HEADER + self.data.len(), opcode::DMX);
        buf.put_u16(self.version);
        buf.put_u8(self.sequence);
        buf.put_u8(self.physical);
        buf.put_u8(self.sub_uni);
        buf.put_u8(self.net);
        buf.put_u16(self.data.len() as u16);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < DMX_HEADER {
            return Err(Error::Truncated {
                needed: HEADER_SIZE + DMX_HEADER,
                have: HEADER_SIZE + payload.len(),
            });
        }
        let mut buf = payload;
        let version = buf.get_u16();
        let sequence = buf.get_u8();
        let physical = buf.get_u8();
        let sub_uni = buf.get_u8();
        let net = buf.get_u8();
        let declared = buf.get_u16() as usize;
        // Oversize and undersize universes are both legal; never read past
        // the bytes actually received.
        let available = declared.min(buf.remaining());
        let data = Bytes::copy_from_slice(&buf[..available]);
        Ok(Self {
            version,
            sequence,
            physical,
            sub_uni,
            net,
            data,
        })
    }
}

/// Write `s` into a fixed-width NUL-padded field.
fn put_padded(buf: &mut BytesMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

/// Consume a fixed-width field, trimming trailing NUL padding.
fn take_str(buf: &mut &[u8], width: usize) -> String {
    let (head, rest) = buf.split_at(width);
    *buf = rest;
    String::from_utf8_lossy(head)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_field_roundtrip() {
        let mut buf = BytesMut::new();
        put_padded(&mut buf, "alpha", 18);
        assert_eq!(buf.len(), 18);
        let mut slice: &[u8] = &buf;
        assert_eq!(take_str(&mut slice, 18), "alpha");
        assert!(slice.is_empty());
    }

    #[test]
    fn test_padded_field_truncates() {
        let mut buf = BytesMut::new();
        put_padded(&mut buf, "a very long name that does not fit", 18);
        assert_eq!(buf.len(), 18);
    }

    #[test]
    fn test_dmx_len_exceeds_datagram() {
        // declared channel-count of 512 but only 3 bytes on the wire
        let dmx = ArtDmx::new(
            crate::PortAddress::new(8).unwrap(),
            1,
            0,
            Bytes::from_static(&[1, 2, 3]),
        );
        let mut wire = dmx.encode().to_vec();
        wire[16] = 0x02;
        wire[17] = 0x00;
        let decoded = match decode(&wire).unwrap() {
            ArtPacket::Dmx(d) => d,
            other => panic!("expected dmx, got {:?}", other),
        };
        assert_eq!(decoded.data.len(), 3);
    }
}
