// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The static, deserializable parameters a concrete deployment supplies.
//!
//! Loading this from a file, FIDL-like RPC, or environment is outside the
//! core's scope; `ServerConfig` is plain data so an embedding binary can keep
//! it in whatever format it likes.

use crate::error::DhcpError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub broadcast_addr: Ipv4Addr,
    #[serde(default)]
    pub routers: Vec<Ipv4Addr>,
    #[serde(default)]
    pub dns_servers: Vec<Ipv4Addr>,
    pub default_lease_time_s: u32,
    pub max_lease_time_s: u32,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), DhcpError> {
        if self.default_lease_time_s == 0 {
            return Err(DhcpError::InvalidConfig("default_lease_time_s must be non-zero"));
        }
        if self.default_lease_time_s > self.max_lease_time_s {
            return Err(DhcpError::InvalidConfig("default_lease_time_s exceeds max_lease_time_s"));
        }
        Ok(())
    }
}

/// The subset of a client request relevant to lease-time negotiation,
/// parsed out of the inbound message's options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestedConfig {
    pub lease_time_s: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            server_ip: Ipv4Addr::new(192, 0, 2, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            broadcast_addr: Ipv4Addr::new(192, 0, 2, 255),
            routers: vec![Ipv4Addr::new(192, 0, 2, 1)],
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8)],
            default_lease_time_s: 3600,
            max_lease_time_s: 86400,
        }
    }

    #[test]
    fn validate_accepts_sane_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_default_exceeding_max() {
        let mut config = valid_config();
        config.default_lease_time_s = config.max_lease_time_s + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_default_lease() {
        let mut config = valid_config();
        config.default_lease_time_s = 0;
        assert!(config.validate().is_err());
    }
}
