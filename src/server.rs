// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-datagram server state machine: validates an inbound message,
//! consults a [`LeaseProvider`], and produces a reply plus the destination
//! address it should be sent to.
//!
//! The server itself holds no durable state between datagrams; everything
//! that must survive across requests belongs to the injected
//! `LeaseProvider`.

use crate::configuration::ServerConfig;
use crate::error::DhcpError;
use crate::lease::LeaseProvider;
use crate::message::{DhcpMessage, OpCode, CLIENT_PORT, SERVER_PORT};
use crate::option_code::{OptionCode, NAK_OPTIONS};
use crate::option_value::{ClientIdentifier, MessageType, OptionCodeList};
use crate::options::Options;
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// What the server decided to do with an inbound datagram.
#[derive(Debug, PartialEq)]
pub enum ServerAction {
    /// Send `message` to `destination`; `max_packet_size` is the budget the
    /// caller should pass to `DhcpMessage::encode` (derived from the
    /// client's option 57, floored at the RFC 2131 minimum).
    SendResponse { message: DhcpMessage, destination: SocketAddrV4, max_packet_size: usize },
    /// A `DECLINE` or `RELEASE` was processed; no reply is sent.
    AddressReleased,
}

#[derive(Debug, Error, PartialEq)]
pub enum ServerError {
    #[error("client message error: {0}")]
    ClientMessageError(DhcpError),

    #[error("unexpected client message type: {0}")]
    UnexpectedClientMessageType(MessageType),

    #[error("message did not originate from a client (op != BOOTREQUEST)")]
    NotARequest,

    #[error("lease provider declined to offer a lease")]
    NoLeaseOffered,
}

pub struct DhcpServer<P: LeaseProvider> {
    config: ServerConfig,
    provider: P,
}

impl<P: LeaseProvider> DhcpServer<P> {
    pub fn new(config: ServerConfig, provider: P) -> Self {
        DhcpServer { config, provider }
    }

    /// Dispatches an incoming DHCP message to the appropriate handler.
    ///
    /// Returns `Ok(None)` when the message should be silently dropped (a
    /// foreign-server request, an expired/denied lease, an unhandled
    /// message type), and `Err` only for malformed client input the caller
    /// may want to log distinctly from an ordinary drop.
    pub fn dispatch(&mut self, msg: &DhcpMessage) -> Result<Option<ServerAction>, ServerError> {
        if msg.op != OpCode::BootRequest {
            log::warn!("dropping non-request message from {}", msg.client_id());
            return Err(ServerError::NotARequest);
        }

        let message_type =
            msg.message_type().map_err(ServerError::ClientMessageError)?;

        if matches!(message_type, MessageType::Offer | MessageType::Ack | MessageType::Nak) {
            return Err(ServerError::UnexpectedClientMessageType(message_type));
        }

        if let Some(directed_at) = self.foreign_server_id(msg) {
            log::info!(
                "message from {} directed at foreign server {}, ignoring",
                msg.client_id(),
                directed_at
            );
            if message_type == MessageType::Request {
                self.provider.release(&msg.client_id(), self.config.server_ip, msg);
            }
            return Ok(None);
        }

        match message_type {
            MessageType::Discover => self.handle_discover(msg),
            MessageType::Request => self.handle_request(msg),
            MessageType::Inform => self.handle_inform(msg),
            MessageType::Decline | MessageType::Release => {
                self.provider.release(&msg.client_id(), self.config.server_ip, msg);
                Ok(Some(ServerAction::AddressReleased))
            }
            MessageType::Offer | MessageType::Ack | MessageType::Nak => unreachable!(),
        }
    }

    /// `Some(server_ip)` if option 54 is present and names a server other
    /// than this one.
    fn foreign_server_id(&self, msg: &DhcpMessage) -> Option<Ipv4Addr> {
        match msg.options.get::<Ipv4Addr>(OptionCode::ServerId as u8) {
            Ok(Some(ip)) if ip != self.config.server_ip => Some(ip),
            _ => None,
        }
    }

    fn handle_discover(&mut self, disc: &DhcpMessage) -> Result<Option<ServerAction>, ServerError> {
        let client_id = disc.client_id();
        let Some(lease) = self.provider.acquire(&client_id, self.config.server_ip, disc) else {
            log::info!("no lease available for {}", client_id);
            return Ok(None);
        };
        self.reply(disc, lease, MessageType::Offer, MessageType::Offer)
    }

    fn handle_request(&mut self, req: &DhcpMessage) -> Result<Option<ServerAction>, ServerError> {
        let client_id = req.client_id();
        let Some(lease) = self.provider.acquire(&client_id, self.config.server_ip, req) else {
            log::info!("no lease available for {}", client_id);
            return Ok(None);
        };

        let requested = req
            .options
            .get::<Ipv4Addr>(OptionCode::RequestedIpAddr as u8)
            .map_err(ServerError::ClientMessageError)?
            .filter(|ip| !ip.is_unspecified())
            .unwrap_or(req.ciaddr);

        let reply_type = if Some(requested) == lease.ip && lease.ip.is_some() {
            MessageType::Ack
        } else {
            MessageType::Nak
        };

        self.reply(req, lease, MessageType::Request, reply_type)
    }

    fn handle_inform(&mut self, inf: &DhcpMessage) -> Result<Option<ServerAction>, ServerError> {
        let client_id = inf.client_id();
        let Some(mut lease) = self.provider.acquire(&client_id, self.config.server_ip, inf) else {
            log::info!("no lease available for {}", client_id);
            return Ok(None);
        };
        // INFORM never allocates an address; the client already has one.
        lease.ip = None;
        lease.lease_seconds = None;
        self.reply(inf, lease, MessageType::Inform, MessageType::Ack)
    }

    /// Shared reply construction for DISCOVER/REQUEST/INFORM: copies the
    /// request's correlating fields, merges in the provider's options,
    /// stamps the lease-time and server-id options, applies the client's
    /// parameter-request-list filter, and picks a destination address.
    fn reply(
        &self,
        request: &DhcpMessage,
        lease: crate::lease::Lease,
        inbound_type: MessageType,
        reply_type: MessageType,
    ) -> Result<Option<ServerAction>, ServerError> {
        let mut reply = DhcpMessage {
            op: OpCode::BootReply,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            broadcast: request.broadcast,
            ciaddr: request.ciaddr,
            yiaddr: lease.ip.filter(|_| reply_type != MessageType::Nak).unwrap_or(Ipv4Addr::UNSPECIFIED),
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: request.giaddr,
            chaddr: request.chaddr.clone(),
            sname: String::new(),
            file: String::new(),
            options: Options::new(),
        };

        if reply_type == MessageType::Nak {
            reply.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Nak);
            reply.options.set(OptionCode::ServerId as u8, &self.config.server_ip);
            if let Ok(Some(message)) = request.options.get::<crate::option_value::Str>(OptionCode::Message as u8) {
                reply.options.set(OptionCode::Message as u8, &message);
            }
            apply_nak_parameter_filter(&mut reply.options, request);
            reply.options.move_to_front(OptionCode::DhcpMessageType as u8);
            return Ok(Some(ServerAction::SendResponse {
                message: reply,
                destination: self.destination(request, inbound_type),
                max_packet_size: self.max_packet_size(request),
            }));
        }

        reply.options = lease.options;

        if let Some(seconds) = lease.lease_seconds {
            if seconds == 0 {
                log::info!("lease for {} expired at offer time", request.client_id());
                return Ok(None);
            }
            // Only a lease that actually carries an address gets a lease-time option.
            if lease.ip.is_some() {
                reply.options.set(OptionCode::IpAddrLeaseTime as u8, &seconds);
            }
        }
        reply.options.set(OptionCode::ServerId as u8, &self.config.server_ip);
        reply.options.set(OptionCode::DhcpMessageType as u8, &reply_type);

        apply_parameter_request_filter(&mut reply.options, request);
        reply.options.move_to_front(OptionCode::DhcpMessageType as u8);

        Ok(Some(ServerAction::SendResponse {
            message: reply,
            destination: self.destination(request, inbound_type),
            max_packet_size: self.max_packet_size(request),
        }))
    }

    /// The client's option 57 (maximum DHCP message size), floored at the
    /// RFC 2131 minimum.
    fn max_packet_size(&self, request: &DhcpMessage) -> usize {
        request
            .options
            .get::<u16>(OptionCode::MaxDhcpMessageSize as u8)
            .ok()
            .flatten()
            .map(|v| v as usize)
            .unwrap_or(crate::message::MIN_PACKET_SIZE)
            .max(crate::message::MIN_PACKET_SIZE)
    }

    /// RFC 2131 §4.1: relay first, then broadcast/unicast by flag and
    /// `ciaddr`.
    fn destination(&self, request: &DhcpMessage, _inbound_type: MessageType) -> SocketAddrV4 {
        if !request.giaddr.is_unspecified() {
            SocketAddrV4::new(request.giaddr, SERVER_PORT)
        } else if request.broadcast || request.ciaddr.is_unspecified() {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT)
        } else {
            SocketAddrV4::new(request.ciaddr, CLIENT_PORT)
        }
    }
}

/// Restricts `options` to the client's requested set (option 55) plus the
/// always-included message-type (53), server-id (54), and lease-time (51)
/// options, which always lead the reply ahead of whatever the client asked
/// for. A client that sends no parameter request list gets every option the
/// provider supplied, unfiltered.
fn apply_parameter_request_filter(options: &mut Options, request: &DhcpMessage) {
    let Ok(Some(OptionCodeList(requested))) =
        request.options.get::<OptionCodeList>(OptionCode::ParameterRequestList as u8)
    else {
        return;
    };

    let mut filtered = Options::new();
    for code in [OptionCode::DhcpMessageType as u8, OptionCode::ServerId as u8, OptionCode::IpAddrLeaseTime as u8]
    {
        if let Some(data) = options.get_raw(code) {
            filtered.set_raw(code, data.to_vec());
        }
    }
    for code in &requested {
        if !filtered.contains(*code) {
            if let Some(data) = options.get_raw(*code) {
                filtered.set_raw(*code, data.to_vec());
            }
        }
    }
    *options = filtered;
}

/// NAK replies are restricted to {53, 56, 61, 60, 54} regardless of the
/// client's parameter request list (RFC 2131 §4.3.2) -- 53 (the message type
/// itself) always leads, followed by `NAK_OPTIONS` -- and the client's own
/// identifier is echoed back verbatim.
fn apply_nak_parameter_filter(options: &mut Options, request: &DhcpMessage) {
    if let Ok(Some(id)) = request.options.get::<ClientIdentifier>(OptionCode::ClientIdentifier as u8) {
        options.set(OptionCode::ClientIdentifier as u8, &id);
    }
    if let Ok(Some(vendor)) =
        request.options.get::<crate::option_value::Str>(OptionCode::VendorClassIdentifier as u8)
    {
        options.set(OptionCode::VendorClassIdentifier as u8, &vendor);
    }
    let mut filtered = Options::new();
    for code in [OptionCode::DhcpMessageType as u8].into_iter().chain(NAK_OPTIONS) {
        if let Some(data) = options.get_raw(code) {
            filtered.set_raw(code, data.to_vec());
        }
    }
    *options = filtered;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::{DefaultLeaseProvider, Lease};

    fn config() -> ServerConfig {
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

    fn random_chaddr() -> Vec<u8> {
        use rand::Rng;
        (0..6).map(|_| rand::thread_rng().gen()).collect()
    }

    fn discover() -> DhcpMessage {
        use rand::Rng;
        let mut msg = DhcpMessage::new_request(random_chaddr(), rand::thread_rng().gen());
        msg.broadcast = true;
        msg.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Discover);
        msg.options.set(
            OptionCode::ParameterRequestList as u8,
            &OptionCodeList(vec![OptionCode::SubnetMask as u8, OptionCode::Router as u8]),
        );
        msg
    }

    struct FixedProvider(Option<Lease>);
    impl LeaseProvider for FixedProvider {
        fn acquire(&mut self, _: &str, _: Ipv4Addr, _: &DhcpMessage) -> Option<Lease> {
            self.0.clone()
        }
        fn release(&mut self, _: &str, _: Ipv4Addr, _: &DhcpMessage) {}
    }

    #[test]
    fn discover_yields_offer_with_requested_options_and_broadcast_destination() {
        let mut server = DhcpServer::new(config(), DefaultLeaseProvider::new(config()));
        let action = server.dispatch(&discover()).unwrap().unwrap();
        let ServerAction::SendResponse { message: reply, destination, .. } = action else {
            panic!("expected a reply")
        };
        assert_eq!(reply.message_type().unwrap(), MessageType::Offer);
        assert_eq!(destination, SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT));
        assert!(reply.options.contains(OptionCode::SubnetMask as u8));
        assert!(reply.options.contains(OptionCode::Router as u8));
        // Message type must come first in the serialized option stream.
        assert_eq!(reply.options.iter().next().unwrap().0, OptionCode::DhcpMessageType as u8);
    }

    #[test]
    fn request_matching_offered_ip_is_acked() {
        let mut req = discover();
        req.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Request);
        req.options.set(OptionCode::RequestedIpAddr as u8, &Ipv4Addr::new(192, 0, 2, 60));
        req.ciaddr = Ipv4Addr::UNSPECIFIED;

        let mut lease_options = Options::new();
        lease_options.set(OptionCode::SubnetMask as u8, &Ipv4Addr::new(255, 255, 255, 0));
        lease_options.set(OptionCode::Router as u8, &Ipv4Addr::new(192, 0, 2, 1));
        let provider = FixedProvider(Some(Lease {
            ip: Some(Ipv4Addr::new(192, 0, 2, 60)),
            lease_seconds: Some(3600),
            options: lease_options,
        }));
        let mut server = DhcpServer::new(config(), provider);
        let action = server.dispatch(&req).unwrap().unwrap();
        let ServerAction::SendResponse { message: reply, .. } = action else { panic!("expected a reply") };
        assert_eq!(reply.message_type().unwrap(), MessageType::Ack);
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 0, 2, 60));
        // Message type, server id, and lease time always lead, ahead of the
        // client's requested options.
        let codes: Vec<u8> = reply.options.iter().map(|(c, _)| c).collect();
        assert_eq!(
            codes,
            vec![
                OptionCode::DhcpMessageType as u8,
                OptionCode::ServerId as u8,
                OptionCode::IpAddrLeaseTime as u8,
                OptionCode::SubnetMask as u8,
                OptionCode::Router as u8,
            ]
        );
    }

    #[test]
    fn request_mismatched_ip_is_nakked_with_restricted_options() {
        let mut req = discover();
        req.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Request);
        req.options.set(OptionCode::RequestedIpAddr as u8, &Ipv4Addr::new(192, 0, 2, 99));

        let provider = FixedProvider(Some(Lease {
            ip: Some(Ipv4Addr::new(192, 0, 2, 60)),
            lease_seconds: Some(3600),
            options: Options::new(),
        }));
        let mut server = DhcpServer::new(config(), provider);
        let action = server.dispatch(&req).unwrap().unwrap();
        let ServerAction::SendResponse { message: reply, .. } = action else { panic!("expected a reply") };
        assert_eq!(reply.message_type().unwrap(), MessageType::Nak);
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert!(!reply.options.contains(OptionCode::IpAddrLeaseTime as u8));
    }

    #[test]
    fn inform_acks_without_yiaddr_or_lease_time() {
        let mut inf = discover();
        inf.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Inform);
        inf.ciaddr = Ipv4Addr::new(192, 0, 2, 77);

        let mut server = DhcpServer::new(config(), DefaultLeaseProvider::new(config()));
        let action = server.dispatch(&inf).unwrap().unwrap();
        let ServerAction::SendResponse { message: reply, .. } = action else { panic!("expected a reply") };
        assert_eq!(reply.message_type().unwrap(), MessageType::Ack);
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert!(!reply.options.contains(OptionCode::IpAddrLeaseTime as u8));
    }

    #[test]
    fn foreign_server_id_on_request_triggers_release_and_no_reply() {
        struct ReleaseTrackingProvider(std::cell::RefCell<bool>);
        impl LeaseProvider for ReleaseTrackingProvider {
            fn acquire(&mut self, _: &str, _: Ipv4Addr, _: &DhcpMessage) -> Option<Lease> {
                None
            }
            fn release(&mut self, _: &str, _: Ipv4Addr, _: &DhcpMessage) {
                *self.0.borrow_mut() = true;
            }
        }
        let mut req = discover();
        req.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Request);
        req.options.set(OptionCode::ServerId as u8, &Ipv4Addr::new(198, 51, 100, 5));

        let provider = ReleaseTrackingProvider(std::cell::RefCell::new(false));
        let mut server = DhcpServer::new(config(), provider);
        let action = server.dispatch(&req).unwrap();
        assert_eq!(action, None);
        assert!(*server.provider.0.borrow());
    }

    #[test]
    fn decline_releases_and_produces_no_reply() {
        let mut dec = discover();
        dec.options.set(OptionCode::DhcpMessageType as u8, &MessageType::Decline);
        let mut server = DhcpServer::new(config(), DefaultLeaseProvider::new(config()));
        let action = server.dispatch(&dec).unwrap().unwrap();
        assert_eq!(action, ServerAction::AddressReleased);
    }

    #[test]
    fn destination_prefers_relay_giaddr_over_broadcast() {
        let mut req = discover();
        req.giaddr = Ipv4Addr::new(10, 0, 0, 1);
        let server = DhcpServer::new(config(), DefaultLeaseProvider::new(config()));
        assert_eq!(
            server.destination(&req, MessageType::Discover),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), SERVER_PORT)
        );
    }

    #[test]
    fn destination_unicasts_to_ciaddr_when_not_broadcast() {
        let mut req = discover();
        req.broadcast = false;
        req.ciaddr = Ipv4Addr::new(192, 0, 2, 77);
        let server = DhcpServer::new(config(), DefaultLeaseProvider::new(config()));
        assert_eq!(
            server.destination(&req, MessageType::Request),
            SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 77), CLIENT_PORT)
        );
    }
}
