// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The DHCP message codec: the fixed 240-octet BOOTP/DHCP header, the magic
//! cookie, and the option-overload resolution described in RFC 2131 §4.1 and
//! RFC 2132 §9.3.

use crate::error::DhcpError;
use crate::option_code::OptionCode;
use crate::option_value::{MessageType, OverloadFlags};
use crate::options::Options;
use crate::wire;
use num_derive::FromPrimitive;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

const OP_IDX: usize = 0;
const HTYPE_IDX: usize = 1;
const HLEN_IDX: usize = 2;
const XID_IDX: usize = 4;
const SECS_IDX: usize = 8;
const FLAGS_IDX: usize = 10;
const CIADDR_IDX: usize = 12;
const YIADDR_IDX: usize = 16;
const SIADDR_IDX: usize = 20;
const GIADDR_IDX: usize = 24;
const CHADDR_IDX: usize = 28;
const SNAME_IDX: usize = 44;
const FILE_IDX: usize = 108;
const OPTIONS_START_IDX: usize = 236;
const FIXED_HEADER_LEN: usize = 240; // header + magic cookie

const CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const ETHERNET_HTYPE: u8 = 1;
const ETHERNET_HLEN: u8 = 6;

const BROADCAST_FLAG: u16 = 0x8000;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// The minimum legal DHCP packet size (RFC 2131 §4.1, "The minimum legal
/// value for this field is 576").
pub const MIN_PACKET_SIZE: usize = 576;

#[derive(FromPrimitive, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    BootRequest = 1,
    BootReply = 2,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(n: u8) -> Result<Self, u8> {
        <Self as num_traits::FromPrimitive>::from_u8(n).ok_or(n)
    }
}

/// A decoded DHCP message. All fields follow the naming conventions of RFC
/// 2131; `sname`/`file` have already had any option-overload payload peeled
/// back out into `options` by [`DhcpMessage::decode`].
#[derive(Clone, Debug, PartialEq)]
pub struct DhcpMessage {
    pub op: OpCode,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub broadcast: bool,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: Vec<u8>,
    pub sname: String,
    pub file: String,
    pub options: Options,
}

impl DhcpMessage {
    pub fn new_request(chaddr: Vec<u8>, xid: u32) -> Self {
        DhcpMessage {
            op: OpCode::BootRequest,
            htype: ETHERNET_HTYPE,
            hlen: ETHERNET_HLEN,
            hops: 0,
            xid,
            secs: 0,
            broadcast: false,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: String::new(),
            file: String::new(),
            options: Options::new(),
        }
    }

    /// Decodes a datagram into a `DhcpMessage`, resolving option overload
    /// (option 52) in the RFC-documented order: options area, then `file`,
    /// then `sname`.
    pub fn decode(buf: &[u8]) -> Result<Self, DhcpError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(DhcpError::MalformedPacket { reason: "buffer shorter than fixed header" });
        }
        let op = OpCode::try_from(buf[OP_IDX])
            .map_err(|_| DhcpError::MalformedPacket { reason: "unknown opcode" })?;
        let htype = buf[HTYPE_IDX];
        let hlen = buf[HLEN_IDX].min(CHADDR_LEN as u8);
        let hops = buf[3];
        let xid = wire::read_u32(&buf[XID_IDX..])?;
        let secs = wire::read_u16(&buf[SECS_IDX..])?;
        let flags = wire::read_u16(&buf[FLAGS_IDX..])?;
        let ciaddr = wire::read_ipv4(&buf[CIADDR_IDX..])?;
        let yiaddr = wire::read_ipv4(&buf[YIADDR_IDX..])?;
        let siaddr = wire::read_ipv4(&buf[SIADDR_IDX..])?;
        let giaddr = wire::read_ipv4(&buf[GIADDR_IDX..])?;
        let chaddr = buf[CHADDR_IDX..CHADDR_IDX + hlen as usize].to_vec();

        if buf[OPTIONS_START_IDX..FIXED_HEADER_LEN] != MAGIC_COOKIE {
            return Err(DhcpError::MalformedPacket { reason: "bad magic cookie" });
        }

        let (mut options, _consumed, terminated) = Options::decode(&buf[FIXED_HEADER_LEN..])?;
        if !terminated {
            return Err(DhcpError::MalformedPacket { reason: "options area missing end marker" });
        }

        let overload = options
            .get::<OverloadFlags>(OptionCode::OptionOverload as u8)?
            .unwrap_or_default();

        let mut sname_raw = Some(buf[SNAME_IDX..FILE_IDX].to_vec());
        let mut file_raw = Some(buf[FILE_IDX..OPTIONS_START_IDX].to_vec());

        // RFC order: options, then file, then sname.
        if overload.file {
            let (more, _, _) = Options::decode(file_raw.take().unwrap().as_slice())?;
            merge(&mut options, more);
        }
        if overload.sname {
            let (more, _, _) = Options::decode(sname_raw.take().unwrap().as_slice())?;
            merge(&mut options, more);
        }

        let file = match file_raw {
            Some(raw) => wire::read_fixed_string(&raw)?,
            None => options
                .get::<crate::option_value::Str>(OptionCode::BootfileName as u8)?
                .map(|s| s.0)
                .unwrap_or_default(),
        };
        let sname = match sname_raw {
            Some(raw) => wire::read_fixed_string(&raw)?,
            None => options
                .get::<crate::option_value::Str>(OptionCode::TftpServerName as u8)?
                .map(|s| s.0)
                .unwrap_or_default(),
        };

        Ok(DhcpMessage {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            broadcast: flags & BROADCAST_FLAG != 0,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Encodes the message, applying option overload if the options area
    /// would not otherwise fit within `max_size`. Fails with
    /// `PacketTooLargeForBudget` if the options still don't fit after
    /// overloading both `file` and `sname`.
    pub fn encode(&self, max_size: usize) -> Result<Vec<u8>, DhcpError> {
        let max_size = max_size.max(MIN_PACKET_SIZE);
        let budget = max_size.saturating_sub(FIXED_HEADER_LEN + 1);

        let mut options = self.options.clone();
        let mut sname = self.sname.clone();
        let mut file = self.file.clone();
        let mut overload = OverloadFlags::default();

        if options.encode(1).len() > budget {
            if !file.is_empty() && !options.contains(OptionCode::BootfileName as u8) {
                options.set(OptionCode::BootfileName as u8, &crate::option_value::Str(file.clone()));
                file = String::new();
                overload.file = true;
            }
            if options.encode(1).len() > budget
                && !sname.is_empty()
                && !options.contains(OptionCode::TftpServerName as u8)
            {
                options.set(
                    OptionCode::TftpServerName as u8,
                    &crate::option_value::Str(sname.clone()),
                );
                sname = String::new();
                overload.sname = true;
            }
        }

        if !overload.is_empty() {
            options.set(OptionCode::OptionOverload as u8, &overload);
        }
        options.move_to_front(OptionCode::DhcpMessageType as u8);

        let (main_area, leftover) = options.partial_encode(budget, 1);
        let (file_area, leftover) = match leftover {
            Some(rest) if overload.file => {
                let (enc, rest) = rest.partial_encode(FILE_LEN, 1);
                (enc, rest)
            }
            rest => (Vec::new(), rest),
        };
        let (sname_area, leftover) = match leftover {
            Some(rest) if overload.sname => {
                let (enc, rest) = rest.partial_encode(SNAME_LEN, 1);
                (enc, rest)
            }
            rest => (Vec::new(), rest),
        };
        if leftover.is_some() {
            return Err(DhcpError::PacketTooLargeForBudget);
        }

        let mut buf = Vec::with_capacity(max_size);
        buf.push(self.op.into());
        buf.push(self.htype);
        buf.push(self.hlen);
        buf.push(self.hops);
        wire::write_u32(&mut buf, self.xid);
        wire::write_u16(&mut buf, self.secs);
        wire::write_u16(&mut buf, if self.broadcast { BROADCAST_FLAG } else { 0 });
        wire::write_ipv4(&mut buf, self.ciaddr);
        wire::write_ipv4(&mut buf, self.yiaddr);
        wire::write_ipv4(&mut buf, self.siaddr);
        wire::write_ipv4(&mut buf, self.giaddr);
        let mut chaddr = self.chaddr.clone();
        chaddr.resize(CHADDR_LEN, 0);
        buf.extend_from_slice(&chaddr);

        if overload.sname {
            buf.extend_from_slice(&sname_area);
            buf.resize(buf.len().max(SNAME_IDX + SNAME_LEN), 0);
        } else {
            wire::write_fixed_string(&mut buf, &sname, SNAME_LEN);
        }
        if overload.file {
            buf.extend_from_slice(&file_area);
            buf.resize(buf.len().max(FILE_IDX + FILE_LEN), 0);
        } else {
            wire::write_fixed_string(&mut buf, &file, FILE_LEN);
        }

        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&main_area);
        Ok(buf)
    }

    pub fn message_type(&self) -> Result<MessageType, DhcpError> {
        self.options
            .get::<MessageType>(OptionCode::DhcpMessageType as u8)?
            .ok_or(DhcpError::MalformedPacket { reason: "missing dhcp message type option" })
    }

    /// Option 61 verbatim, or `htype || chaddr` if absent, rendered as
    /// colon-separated uppercase hex.
    pub fn client_id(&self) -> String {
        match self.options.get::<crate::option_value::ClientIdentifier>(OptionCode::ClientIdentifier as u8) {
            Ok(Some(id)) => id.to_hex_string(),
            _ => {
                let mut bytes = vec![self.htype];
                bytes.extend_from_slice(&self.chaddr);
                bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(":")
            }
        }
    }

    /// A human-readable rendering used for diagnostics, matching the shape
    /// of a packet trace dump.
    pub fn dump(&self) -> String {
        let mut lines = vec![
            format!("OP: {:?}", self.op),
            format!("Transaction ID: {}", self.xid),
            format!("Client Address: {}", self.ciaddr),
            format!("Your Address: {}", self.yiaddr),
            format!("Gateway Address: {}", self.giaddr),
            format!("Client ID: {}", self.client_id()),
            "OPTIONS:".to_string(),
        ];
        for (code, data) in self.options.iter() {
            let decoded = crate::option_code::decode(code, data)
                .map(|v| v.to_string())
                .unwrap_or_else(|e| format!("<{}>", e));
            lines.push(format!("  [{:>3}] {:<24}: {}", code, crate::option_code::name_of(code), decoded));
        }
        lines.join("\n")
    }
}

fn merge(base: &mut Options, extra: Options) {
    for (code, data) in extra {
        base.append_raw(code, &data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option_value::Str;

    fn sample() -> DhcpMessage {
        let mut msg = DhcpMessage::new_request(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06], 42);
        msg.secs = 1024;
        msg.yiaddr = Ipv4Addr::new(192, 168, 1, 1);
        msg.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Discover);
        msg.options.set(OptionCode::SubnetMask as u8, &Ipv4Addr::new(255, 255, 255, 0));
        msg
    }

    #[test]
    fn encode_then_decode_is_semantically_equal() {
        let msg = sample();
        let encoded = msg.encode(MIN_PACKET_SIZE).unwrap();
        let decoded = DhcpMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.xid, msg.xid);
        assert_eq!(decoded.yiaddr, msg.yiaddr);
        assert_eq!(decoded.message_type().unwrap(), MessageType::Discover);
        assert_eq!(
            decoded.options.get::<Ipv4Addr>(OptionCode::SubnetMask as u8).unwrap(),
            Some(Ipv4Addr::new(255, 255, 255, 0))
        );
    }

    #[test]
    fn message_type_is_moved_to_front_on_encode() {
        let msg = sample();
        let encoded = msg.encode(MIN_PACKET_SIZE).unwrap();
        // Fixed header + cookie, then the first option's code byte.
        assert_eq!(encoded[240], OptionCode::DhcpMessageType as u8);
    }

    #[test]
    fn decode_rejects_bad_magic_cookie() {
        let mut encoded = sample().encode(MIN_PACKET_SIZE).unwrap();
        encoded[236] = 0;
        assert!(matches!(DhcpMessage::decode(&encoded), Err(DhcpError::MalformedPacket { .. })));
    }

    #[test]
    fn overload_round_trips_a_long_bootfile_name() {
        let mut msg = sample();
        msg.file = "a".repeat(200);
        // Pad the options area so the packet cannot fit in 576 bytes without overload.
        msg.options.set(60, &Str("b".repeat(400)));

        let encoded = msg.encode(MIN_PACKET_SIZE).unwrap();
        let decoded = DhcpMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.file, msg.file);
        let overload = decoded.options.get::<OverloadFlags>(OptionCode::OptionOverload as u8).unwrap();
        assert!(overload.unwrap().file);
    }

    #[test]
    fn encode_fails_when_options_exceed_budget_even_after_overload() {
        let mut msg = sample();
        msg.file = "a".repeat(200);
        msg.sname = "b".repeat(100);
        // Too large to fit even with both file and sname overloaded away.
        msg.options.set(60, &Str("c".repeat(4000)));

        assert!(matches!(
            msg.encode(MIN_PACKET_SIZE),
            Err(DhcpError::PacketTooLargeForBudget)
        ));
    }

    #[test]
    fn client_id_falls_back_to_htype_and_chaddr() {
        let msg = sample();
        assert_eq!(msg.client_id(), "01:01:02:03:04:05:06");
    }
}
