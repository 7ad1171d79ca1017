// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The `LeaseProvider` boundary the server calls into, and a reference
//! implementation that is not backed by persistence, matching the "not
//! persistence-backed inside the core" constraint: any multi-client address
//! pool, lease store, or database lives outside this crate, behind this
//! trait.

use crate::configuration::{RequestedConfig, ServerConfig};
use crate::message::DhcpMessage;
use crate::option_code::OptionCode;
use crate::options::Options;
use std::net::Ipv4Addr;

/// The outcome of a successful `acquire` call: the address (if any) to hand
/// to the client, its remaining lifetime in seconds (`None` means
/// infinite), and any additional options (subnet mask, routers, DNS
/// servers, ...) the provider wants included in the reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Lease {
    pub ip: Option<Ipv4Addr>,
    pub lease_seconds: Option<u32>,
    pub options: Options,
}

impl Lease {
    pub fn none() -> Self {
        Lease { ip: None, lease_seconds: None, options: Options::new() }
    }
}

pub trait LeaseProvider {
    /// Produces the authoritative answer for `msg`. Returning `None` tells
    /// the server to drop the datagram without a reply.
    fn acquire(&mut self, client_id: &str, server_ip: Ipv4Addr, msg: &DhcpMessage) -> Option<Lease>;

    /// Releases any lease held by `client_id`. Idempotent: a client with no
    /// lease is not an error.
    fn release(&mut self, client_id: &str, server_ip: Ipv4Addr, msg: &DhcpMessage);
}

/// A `LeaseProvider` with no persistence and no multi-client bookkeeping: it
/// always offers the client's requested address (or `ciaddr`) back to it,
/// stamped with the static parameters from `ServerConfig`. Useful as a
/// reference implementation and in tests; a real deployment manages address
/// assignment and replaces this.
pub struct DefaultLeaseProvider {
    config: ServerConfig,
}

impl DefaultLeaseProvider {
    pub fn new(config: ServerConfig) -> Self {
        DefaultLeaseProvider { config }
    }

    /// Option 51 from the request, if any (RFC 2131 §4.3.1: a client may
    /// request a specific lease duration).
    fn requested_config(msg: &DhcpMessage) -> RequestedConfig {
        RequestedConfig {
            lease_time_s: msg.options.get::<u32>(OptionCode::IpAddrLeaseTime as u8).ok().flatten(),
        }
    }

    fn base_options(&self) -> Options {
        let mut options = Options::new();
        options.set(OptionCode::SubnetMask as u8, &self.config.subnet_mask);
        if !self.config.routers.is_empty() {
            options.set(OptionCode::Router as u8, &self.config.routers);
        }
        if !self.config.dns_servers.is_empty() {
            options.set(OptionCode::DomainNameServer as u8, &self.config.dns_servers);
        }
        options.set(OptionCode::BroadcastAddr as u8, &self.config.broadcast_addr);
        options
    }
}

impl LeaseProvider for DefaultLeaseProvider {
    fn acquire(&mut self, _client_id: &str, _server_ip: Ipv4Addr, msg: &DhcpMessage) -> Option<Lease> {
        let requested = msg
            .options
            .get::<Ipv4Addr>(OptionCode::RequestedIpAddr as u8)
            .ok()
            .flatten()
            .filter(|ip| !ip.is_unspecified())
            .or_else(|| Some(msg.ciaddr).filter(|ip| !ip.is_unspecified()));

        let lease_seconds = Self::requested_config(msg)
            .lease_time_s
            .filter(|&s| s > 0)
            .map(|s| s.min(self.config.max_lease_time_s))
            .unwrap_or(self.config.default_lease_time_s);

        Some(Lease { ip: requested, lease_seconds: Some(lease_seconds), options: self.base_options() })
    }

    fn release(&mut self, _client_id: &str, _server_ip: Ipv4Addr, _msg: &DhcpMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DhcpMessage;

    fn config() -> ServerConfig {
        ServerConfig {
            server_ip: Ipv4Addr::new(192, 0, 2, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            broadcast_addr: Ipv4Addr::new(192, 0, 2, 255),
            routers: vec![Ipv4Addr::new(192, 0, 2, 1)],
            dns_servers: vec![],
            default_lease_time_s: 3600,
            max_lease_time_s: 86400,
        }
    }

    #[test]
    fn acquire_offers_requested_address() {
        let mut provider = DefaultLeaseProvider::new(config());
        let mut msg = DhcpMessage::new_request(vec![1, 2, 3, 4, 5, 6], 1);
        msg.options.set(OptionCode::RequestedIpAddr as u8, &Ipv4Addr::new(192, 0, 2, 50));

        let lease = provider.acquire("01:02:03:04:05:06", config().server_ip, &msg).unwrap();
        assert_eq!(lease.ip, Some(Ipv4Addr::new(192, 0, 2, 50)));
        assert_eq!(lease.lease_seconds, Some(3600));
    }

    #[test]
    fn acquire_falls_back_to_ciaddr() {
        let mut provider = DefaultLeaseProvider::new(config());
        let mut msg = DhcpMessage::new_request(vec![1, 2, 3, 4, 5, 6], 1);
        msg.ciaddr = Ipv4Addr::new(192, 0, 2, 77);

        let lease = provider.acquire("01:02:03:04:05:06", config().server_ip, &msg).unwrap();
        assert_eq!(lease.ip, Some(Ipv4Addr::new(192, 0, 2, 77)));
    }

    #[test]
    fn acquire_clamps_requested_lease_time_to_max() {
        let mut provider = DefaultLeaseProvider::new(config());
        let mut msg = DhcpMessage::new_request(vec![1, 2, 3, 4, 5, 6], 1);
        msg.options.set(OptionCode::IpAddrLeaseTime as u8, &(config().max_lease_time_s + 1000));

        let lease = provider.acquire("01:02:03:04:05:06", config().server_ip, &msg).unwrap();
        assert_eq!(lease.lease_seconds, Some(config().max_lease_time_s));
    }

    #[test]
    fn acquire_honors_requested_lease_time_within_bounds() {
        let mut provider = DefaultLeaseProvider::new(config());
        let mut msg = DhcpMessage::new_request(vec![1, 2, 3, 4, 5, 6], 1);
        msg.options.set(OptionCode::IpAddrLeaseTime as u8, &1800u32);

        let lease = provider.acquire("01:02:03:04:05:06", config().server_ip, &msg).unwrap();
        assert_eq!(lease.lease_seconds, Some(1800));
    }
}
