// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The typed values carried by DHCP options.
//!
//! Every concrete value type implements [`OptionValueType`]: `read` decodes a
//! value from (a prefix of) a byte slice and reports how many bytes it
//! consumed, `write` appends a value's wire representation to a buffer. The
//! option code registry (`option_code.rs`) stores one decode constructor per
//! registered code and wraps the result in its own tagged `OptionValue` enum
//! so that heterogeneous option types can flow through one ordered container.

use crate::error::DhcpError;
use crate::wire;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

pub trait OptionValueType: Sized {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError>;
    fn write(&self, out: &mut Vec<u8>);

    /// Some for types whose encoded length never varies; used to validate
    /// option length before decoding.
    fn fixed_length() -> Option<usize> {
        None
    }
}

impl OptionValueType for u8 {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((wire::read_u8(buf)?, 1))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u8(out, *self);
    }
    fn fixed_length() -> Option<usize> {
        Some(1)
    }
}

impl OptionValueType for u16 {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((wire::read_u16(buf)?, 2))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u16(out, *self);
    }
    fn fixed_length() -> Option<usize> {
        Some(2)
    }
}

impl OptionValueType for u32 {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((wire::read_u32(buf)?, 4))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u32(out, *self);
    }
    fn fixed_length() -> Option<usize> {
        Some(4)
    }
}

impl OptionValueType for bool {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((wire::read_u8(buf)? != 0, 1))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u8(out, if *self { 1 } else { 0 });
    }
    fn fixed_length() -> Option<usize> {
        Some(1)
    }
}

impl OptionValueType for Ipv4Addr {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((wire::read_ipv4(buf)?, 4))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_ipv4(out, *self);
    }
    fn fixed_length() -> Option<usize> {
        Some(4)
    }
}

/// Greedily decodes repeated `T` values out of the whole option payload.
impl<T: OptionValueType> OptionValueType for Vec<T> {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        let mut items = Vec::new();
        let mut consumed = 0;
        while consumed < buf.len() {
            let (item, n) = T::read(&buf[consumed..])?;
            if n == 0 {
                return Err(DhcpError::MalformedPacket { reason: "list element consumed zero bytes" });
            }
            items.push(item);
            consumed += n;
        }
        Ok((items, consumed))
    }

    fn write(&self, out: &mut Vec<u8>) {
        for item in self {
            item.write(out);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Str(pub String);

impl OptionValueType for Str {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let text = std::str::from_utf8(&buf[..end])
            .map_err(|_| DhcpError::MalformedPacket { reason: "non-utf8 string option" })?;
        Ok((Str(text.to_owned()), buf.len()))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.0.as_bytes());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl OptionValueType for Bytes {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((Bytes(buf.to_vec()), buf.len()))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

/// Option 55, the client's parameter request list: one raw option code per
/// byte, order-preserving (the server answers in the client's order).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionCodeList(pub Vec<u8>);

impl OptionValueType for OptionCodeList {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((OptionCodeList(buf.to_vec()), buf.len()))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

/// Option 61. Opaque per RFC 2132 §9.14; the first byte is conventionally a
/// hardware-type octet but the server never interprets it, only compares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentifier(pub Vec<u8>);

impl OptionValueType for ClientIdentifier {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        if buf.len() < 2 {
            return Err(DhcpError::InvalidOptionLength { expected: 2, actual: buf.len() });
        }
        Ok((ClientIdentifier(buf.to_vec()), buf.len()))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl ClientIdentifier {
    /// Colon-separated uppercase hex, matching the rendering used for
    /// `DhcpMessage::client_id`.
    pub fn to_hex_string(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(":")
    }
}

/// Option 52. Bit 0 (`0x01`) is FILE, bit 1 (`0x02`) is SNAME.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OverloadFlags {
    pub file: bool,
    pub sname: bool,
}

impl OverloadFlags {
    pub fn is_empty(&self) -> bool {
        !self.file && !self.sname
    }
}

impl From<u8> for OverloadFlags {
    fn from(v: u8) -> Self {
        OverloadFlags { file: v & 0x01 != 0, sname: v & 0x02 != 0 }
    }
}

impl From<OverloadFlags> for u8 {
    fn from(f: OverloadFlags) -> Self {
        (f.file as u8) | ((f.sname as u8) << 1)
    }
}

impl OptionValueType for OverloadFlags {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        Ok((OverloadFlags::from(wire::read_u8(buf)?), 1))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u8(out, (*self).into());
    }
    fn fixed_length() -> Option<usize> {
        Some(1)
    }
}

/// The DHCP message type carried by option 53 (RFC 2132 §9.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        Ok(match v {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            4 => MessageType::Decline,
            5 => MessageType::Ack,
            6 => MessageType::Nak,
            7 => MessageType::Release,
            8 => MessageType::Inform,
            other => return Err(other),
        })
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl OptionValueType for MessageType {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        let byte = wire::read_u8(buf)?;
        let ty = MessageType::try_from(byte).map_err(DhcpError::UnsupportedMessageType)?;
        Ok((ty, 1))
    }
    fn write(&self, out: &mut Vec<u8>) {
        wire::write_u8(out, (*self).into());
    }
    fn fixed_length() -> Option<usize> {
        Some(1)
    }
}

/// Option 121, a single classless static route (RFC 3442): a CIDR
/// destination (only the significant octets of which are transmitted) and a
/// gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClasslessRoute {
    pub prefix_len: u8,
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl OptionValueType for ClasslessRoute {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        let prefix_len = wire::read_u8(buf)?;
        if prefix_len > 32 {
            return Err(DhcpError::MalformedPacket { reason: "classless route prefix > 32" });
        }
        let significant = ((prefix_len as usize) + 7) / 8;
        let need = 1 + significant + 4;
        if buf.len() < need {
            return Err(DhcpError::InvalidOptionLength { expected: need, actual: buf.len() });
        }
        let mut octets = [0u8; 4];
        octets[..significant].copy_from_slice(&buf[1..1 + significant]);
        let destination = Ipv4Addr::from(octets);
        let gateway = wire::read_ipv4(&buf[1 + significant..need])?;
        Ok((ClasslessRoute { prefix_len, destination, gateway }, need))
    }

    fn write(&self, out: &mut Vec<u8>) {
        let significant = ((self.prefix_len as usize) + 7) / 8;
        wire::write_u8(out, self.prefix_len);
        out.extend_from_slice(&self.destination.octets()[..significant]);
        wire::write_ipv4(out, self.gateway);
    }
}

/// Option 119 / option 15 domain lists with RFC 1035 §4.1.4 name
/// compression. Decoding resolves backward pointers; encoding emits a
/// trailing-label-suffix-compressed form so repeated domains reuse their
/// common parent's bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainList(pub Vec<String>);

impl OptionValueType for DomainList {
    fn read(buf: &[u8]) -> Result<(Self, usize), DhcpError> {
        if buf.is_empty() {
            return Ok((DomainList(Vec::new()), 0));
        }
        // offset -> label (None for the root/terminator, Some for a pointer target).
        enum Component {
            Label(String),
            Pointer(usize),
            Root,
        }
        let mut components: Vec<(usize, Component)> = Vec::new();
        let mut domain_starts = vec![0usize];
        let mut i = 0usize;
        while i < buf.len() {
            let start = i;
            let first = buf[i];
            i += 1;
            if first == 0x00 {
                components.push((start, Component::Root));
                if i < buf.len() {
                    domain_starts.push(i);
                }
                continue;
            }
            if first & 0xC0 != 0 {
                if first & 0xC0 != 0xC0 {
                    return Err(DhcpError::MalformedPacket { reason: "reserved name-compression tag" });
                }
                let hi = (first & 0x3F) as usize;
                let lo = *buf.get(i).ok_or(DhcpError::MalformedPacket { reason: "truncated name pointer" })? as usize;
                i += 1;
                let target = (hi << 8) | lo;
                if target >= start {
                    return Err(DhcpError::MalformedPacket { reason: "forward or self name-compression pointer" });
                }
                components.push((start, Component::Pointer(target)));
            } else {
                let len = first as usize;
                let label = buf
                    .get(i..i + len)
                    .ok_or(DhcpError::MalformedPacket { reason: "truncated domain label" })?;
                let label = std::str::from_utf8(label)
                    .map_err(|_| DhcpError::MalformedPacket { reason: "non-utf8 domain label" })?
                    .to_owned();
                i += len;
                components.push((start, Component::Label(label)));
            }
        }

        fn resolve(
            components: &[(usize, Component)],
            start: usize,
            depth: usize,
        ) -> Result<Vec<String>, DhcpError> {
            if depth > components.len() {
                return Err(DhcpError::MalformedPacket { reason: "name-compression pointer loop" });
            }
            let mut labels = Vec::new();
            let mut idx = components.iter().position(|(off, _)| *off == start);
            while let Some(pos) = idx {
                match &components[pos].1 {
                    Component::Root => break,
                    Component::Label(label) => {
                        labels.push(label.clone());
                        idx = components.get(pos + 1).map(|_| pos + 1);
                    }
                    Component::Pointer(target) => {
                        labels.extend(resolve(components, *target, depth + 1)?);
                        break;
                    }
                }
            }
            Ok(labels)
        }

        let mut domains = Vec::new();
        for start in domain_starts {
            if start >= buf.len() {
                continue;
            }
            domains.push(resolve(&components, start, 0)?.join("."));
        }
        Ok((DomainList(domains), buf.len()))
    }

    fn write(&self, out: &mut Vec<u8>) {
        // (label sequence, byte offset it was written at) for suffix reuse.
        let mut written: Vec<(Vec<&str>, usize)> = Vec::new();
        let base = out.len();
        for domain in &self.0 {
            let labels: Vec<&str> = domain.split('.').collect();
            let mut best: Option<(usize, usize)> = None; // (shared_suffix_len, offset_of_suffix)
            for (cand_labels, cand_offset) in &written {
                let mut shared = 0;
                while shared < labels.len()
                    && shared < cand_labels.len()
                    && labels[labels.len() - 1 - shared] == cand_labels[cand_labels.len() - 1 - shared]
                {
                    shared += 1;
                }
                if shared > 0 && best.map_or(true, |(best_len, _)| shared > best_len) {
                    let mut offset = *cand_offset;
                    for label in &cand_labels[..cand_labels.len() - shared] {
                        offset += 1 + label.len();
                    }
                    best = Some((shared, offset));
                }
            }
            let (shared, suffix_offset) = best.unwrap_or((0, 0));
            let unique = &labels[..labels.len() - shared];
            let this_offset = out.len() - base;
            for label in unique {
                out.push(label.len() as u8);
                out.extend_from_slice(label.as_bytes());
            }
            if shared == 0 {
                out.push(0x00);
            } else {
                let ptr = 0xC000u16 | (suffix_offset as u16);
                out.push((ptr >> 8) as u8);
                out.push(ptr as u8);
            }
            written.push((labels, this_offset));
        }
    }
}
