// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Wire codec, option registry, and request-handling state machine for a
//! DHCPv4 server, per RFC 951/1497/2131/2132/3396.
//!
//! This crate is the protocol core only: it decodes and encodes DHCP
//! messages and decides how to answer them, but owns no socket, no lease
//! database, and no process configuration. A deployment wires a transport
//! and a [`lease::LeaseProvider`] implementation around [`server::DhcpServer`].

pub mod configuration;
pub mod error;
pub mod lease;
pub mod message;
pub mod option_code;
pub mod option_value;
pub mod options;
pub mod server;
mod wire;

pub use configuration::ServerConfig;
pub use error::DhcpError;
pub use lease::{DefaultLeaseProvider, Lease, LeaseProvider};
pub use message::DhcpMessage;
pub use server::{DhcpServer, ServerAction, ServerError};
