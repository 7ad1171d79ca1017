// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bounds-checked big-endian primitives shared by the option codec and the
//! fixed BOOTP header codec.

use crate::error::DhcpError;
use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

pub fn read_u8(buf: &[u8]) -> Result<u8, DhcpError> {
    buf.first().copied().ok_or(DhcpError::InvalidOptionLength { expected: 1, actual: buf.len() })
}

pub fn read_u16(buf: &[u8]) -> Result<u16, DhcpError> {
    if buf.len() < 2 {
        return Err(DhcpError::InvalidOptionLength { expected: 2, actual: buf.len() });
    }
    Ok(BigEndian::read_u16(&buf[..2]))
}

pub fn read_u32(buf: &[u8]) -> Result<u32, DhcpError> {
    if buf.len() < 4 {
        return Err(DhcpError::InvalidOptionLength { expected: 4, actual: buf.len() });
    }
    Ok(BigEndian::read_u32(&buf[..4]))
}

pub fn read_ipv4(buf: &[u8]) -> Result<Ipv4Addr, DhcpError> {
    if buf.len() < 4 {
        return Err(DhcpError::InvalidOptionLength { expected: 4, actual: buf.len() });
    }
    Ok(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]))
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    let mut buf = [0u8; 2];
    BigEndian::write_u16(&mut buf, v);
    out.extend_from_slice(&buf);
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, v);
    out.extend_from_slice(&buf);
}

pub fn write_ipv4(out: &mut Vec<u8>, v: Ipv4Addr) {
    out.extend_from_slice(&v.octets());
}

/// Reads a NUL-terminated ASCII/UTF-8 field out of a fixed-width header slot
/// (`sname`, `file`), trimming the terminator and any trailing padding.
pub fn read_fixed_string(buf: &[u8]) -> Result<String, DhcpError> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).map(str::to_owned).map_err(|_| DhcpError::MalformedPacket {
        reason: "non-utf8 fixed-width header string",
    })
}

/// Writes `s` into a fixed-width header slot of length `n`, truncating if too
/// long and zero-padding the remainder otherwise.
pub fn write_fixed_string(out: &mut Vec<u8>, s: &str, n: usize) {
    let bytes = s.as_bytes();
    if bytes.len() >= n {
        out.extend_from_slice(&bytes[..n]);
    } else {
        out.extend_from_slice(bytes);
        out.resize(out.len() + (n - bytes.len()), 0);
    }
}
