// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The error taxonomy threaded through the codec and the server state
//! machine. Decode/handling failures for a single datagram are always
//! recoverable at the datagram granularity: callers log and move on rather
//! than aborting the process.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DhcpError {
    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: &'static str },

    #[error("invalid option length: expected {expected}, got {actual}")]
    InvalidOptionLength { expected: usize, actual: usize },

    #[error("unsupported dhcp message type: {0}")]
    UnsupportedMessageType(u8),

    #[error("encoded options do not fit within the packet size budget")]
    PacketTooLargeForBudget,

    #[error("invalid server configuration: {0}")]
    InvalidConfig(&'static str),
}
