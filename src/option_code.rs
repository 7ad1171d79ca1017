// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The DHCP option code registry: an immutable, total mapping from an
//! 8-bit option code to the value type used to decode and encode it.
//!
//! This enum corresponds to the codes for DHCP options as defined in RFC
//! 1533/2132. Not every assigned code is represented; codes absent from
//! [`OptionCode`] still round-trip through [`Options`](crate::options::Options)
//! as opaque bytes, they just decode through the registry as `Bytes`.

use crate::error::DhcpError;
use crate::option_value::{
    ClasslessRoute, ClientIdentifier, DomainList, MessageType, OptionCodeList, OptionValueType,
    OverloadFlags,
};
use num_derive::FromPrimitive;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

#[derive(FromPrimitive, Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    TimeOffset = 2,
    Router = 3,
    TimeServer = 4,
    NameServer = 5,
    DomainNameServer = 6,
    Hostname = 12,
    DomainName = 15,
    BroadcastAddr = 28,
    NtpServers = 42,
    RequestedIpAddr = 50,
    IpAddrLeaseTime = 51,
    OptionOverload = 52,
    DhcpMessageType = 53,
    ServerId = 54,
    ParameterRequestList = 55,
    Message = 56,
    MaxDhcpMessageSize = 57,
    RenewalTime = 58,
    RebindingTime = 59,
    VendorClassIdentifier = 60,
    ClientIdentifier = 61,
    TftpServerName = 66,
    BootfileName = 67,
    DomainSearch = 119,
    ClasslessStaticRoute = 121,
    End = 255,
}

impl From<OptionCode> for u8 {
    fn from(c: OptionCode) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(n: u8) -> Result<Self, u8> {
        <Self as num_traits::FromPrimitive>::from_u8(n).ok_or(n)
    }
}

/// The option codes the server restricts a NAK's reply options to, per RFC
/// 2131 §4.3.2: the message cause (56), the client's own identifier (61) and
/// vendor class (60) echoed back, and this server's identifier (54).
pub const NAK_OPTIONS: [u8; 4] = [
    OptionCode::Message as u8,
    OptionCode::ClientIdentifier as u8,
    OptionCode::VendorClassIdentifier as u8,
    OptionCode::ServerId as u8,
];

/// A decoded option value, tagged by its concrete type. Used for
/// diagnostics (`DhcpMessage::dump`) and for any caller that wants to
/// inspect an option without knowing its type ahead of time; typed callers
/// should prefer `Options::get::<T>`.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Ipv4(Ipv4Addr),
    Ipv4List(Vec<Ipv4Addr>),
    Str(String),
    Bytes(Vec<u8>),
    DomainList(Vec<String>),
    OptionCodeList(Vec<u8>),
    ClientIdentifier(ClientIdentifier),
    MessageType(MessageType),
    OptionOverload(OverloadFlags),
    ClasslessRoutes(Vec<ClasslessRoute>),
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::U8(v) => write!(f, "{}", v),
            OptionValue::U16(v) => write!(f, "{}", v),
            OptionValue::U32(v) => write!(f, "{}", v),
            OptionValue::Ipv4(v) => write!(f, "{}", v),
            OptionValue::Ipv4List(v) => {
                write!(f, "{}", v.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
            OptionValue::Str(v) => write!(f, "{}", v),
            OptionValue::Bytes(v) => write!(f, "{:02X?}", v),
            OptionValue::DomainList(v) => write!(f, "{}", v.join(", ")),
            OptionValue::OptionCodeList(v) => {
                write!(f, "{}", v.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
            OptionValue::ClientIdentifier(v) => write!(f, "{}", v.to_hex_string()),
            OptionValue::MessageType(v) => write!(f, "{}", v),
            OptionValue::OptionOverload(v) => write!(f, "file={} sname={}", v.file, v.sname),
            OptionValue::ClasslessRoutes(v) => {
                write!(f, "{:?}", v)
            }
        }
    }
}

/// Decodes the raw bytes of `code` through the registry's assigned value
/// type. Unregistered codes decode as opaque `Bytes`.
pub fn decode(code: u8, buf: &[u8]) -> Result<OptionValue, DhcpError> {
    let Ok(known) = OptionCode::try_from(code) else {
        return Ok(OptionValue::Bytes(buf.to_vec()));
    };
    Ok(match known {
        OptionCode::Pad | OptionCode::End => OptionValue::Bytes(buf.to_vec()),
        OptionCode::SubnetMask
        | OptionCode::BroadcastAddr
        | OptionCode::RequestedIpAddr
        | OptionCode::ServerId => OptionValue::Ipv4(read_exact::<Ipv4Addr>(buf)?),
        OptionCode::Router
        | OptionCode::TimeServer
        | OptionCode::NameServer
        | OptionCode::DomainNameServer
        | OptionCode::NtpServers => OptionValue::Ipv4List(read_exact::<Vec<Ipv4Addr>>(buf)?),
        OptionCode::TimeOffset => OptionValue::U32(read_exact::<u32>(buf)?),
        OptionCode::Hostname
        | OptionCode::DomainName
        | OptionCode::VendorClassIdentifier
        | OptionCode::TftpServerName
        | OptionCode::BootfileName => {
            OptionValue::Str(read_exact::<crate::option_value::Str>(buf)?.0)
        }
        OptionCode::IpAddrLeaseTime | OptionCode::RenewalTime | OptionCode::RebindingTime => {
            OptionValue::U32(read_exact::<u32>(buf)?)
        }
        OptionCode::OptionOverload => OptionValue::OptionOverload(read_exact::<OverloadFlags>(buf)?),
        OptionCode::DhcpMessageType => OptionValue::MessageType(read_exact::<MessageType>(buf)?),
        OptionCode::ParameterRequestList => {
            OptionValue::OptionCodeList(read_exact::<OptionCodeList>(buf)?.0)
        }
        OptionCode::Message => OptionValue::Str(read_exact::<crate::option_value::Str>(buf)?.0),
        OptionCode::MaxDhcpMessageSize => OptionValue::U16(read_exact::<u16>(buf)?),
        OptionCode::ClientIdentifier => {
            OptionValue::ClientIdentifier(read_exact::<ClientIdentifier>(buf)?)
        }
        OptionCode::DomainSearch => OptionValue::DomainList(read_exact::<DomainList>(buf)?.0),
        OptionCode::ClasslessStaticRoute => {
            OptionValue::ClasslessRoutes(read_exact::<Vec<ClasslessRoute>>(buf)?)
        }
    })
}

fn read_exact<T: OptionValueType>(buf: &[u8]) -> Result<T, DhcpError> {
    if let Some(expected) = T::fixed_length() {
        if buf.len() != expected {
            return Err(DhcpError::InvalidOptionLength { expected, actual: buf.len() });
        }
    }
    let (value, consumed) = T::read(buf)?;
    if consumed != buf.len() {
        return Err(DhcpError::MalformedPacket { reason: "option did not consume its whole payload" });
    }
    Ok(value)
}

pub fn name_of(code: u8) -> &'static str {
    match OptionCode::try_from(code) {
        Ok(OptionCode::Pad) => "Pad",
        Ok(OptionCode::SubnetMask) => "SubnetMask",
        Ok(OptionCode::TimeOffset) => "TimeOffset",
        Ok(OptionCode::Router) => "Router",
        Ok(OptionCode::TimeServer) => "TimeServer",
        Ok(OptionCode::NameServer) => "NameServer",
        Ok(OptionCode::DomainNameServer) => "DomainNameServer",
        Ok(OptionCode::Hostname) => "Hostname",
        Ok(OptionCode::DomainName) => "DomainName",
        Ok(OptionCode::BroadcastAddr) => "BroadcastAddr",
        Ok(OptionCode::NtpServers) => "NtpServers",
        Ok(OptionCode::RequestedIpAddr) => "RequestedIpAddr",
        Ok(OptionCode::IpAddrLeaseTime) => "IpAddrLeaseTime",
        Ok(OptionCode::OptionOverload) => "OptionOverload",
        Ok(OptionCode::DhcpMessageType) => "DhcpMessageType",
        Ok(OptionCode::ServerId) => "ServerId",
        Ok(OptionCode::ParameterRequestList) => "ParameterRequestList",
        Ok(OptionCode::Message) => "Message",
        Ok(OptionCode::MaxDhcpMessageSize) => "MaxDhcpMessageSize",
        Ok(OptionCode::RenewalTime) => "RenewalTime",
        Ok(OptionCode::RebindingTime) => "RebindingTime",
        Ok(OptionCode::VendorClassIdentifier) => "VendorClassIdentifier",
        Ok(OptionCode::ClientIdentifier) => "ClientIdentifier",
        Ok(OptionCode::TftpServerName) => "TftpServerName",
        Ok(OptionCode::BootfileName) => "BootfileName",
        Ok(OptionCode::DomainSearch) => "DomainSearch",
        Ok(OptionCode::ClasslessStaticRoute) => "ClasslessStaticRoute",
        Ok(OptionCode::End) => "End",
        Err(_) => "Unknown",
    }
}
