use aether_codec::{ApiParser, MessageId, Packable, Packer, ProtocolContext};
use aether_streams::{Gate, StreamError};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::{apis::ClientRootApi, uid::Uid};

pub const LOGIN_BY_UID: MessageId = 6;
pub const LOGIN_BY_ALIAS: MessageId = 7;

/// Outer framing toward a work server.
///
/// The first outbound buffer is wrapped in a `LoginByUid(uid, payload)`
/// message so the server can bind the connection to a client; later writes
/// pass through. Inbound packets are parsed as [`ClientRootApi`] and the
/// relayed safe-api payloads continue upstream.
pub struct LoginGate {
    uid: Uid,
    alias: Option<Uid>,
    protocol: ProtocolContext,
    login_sent: bool,
}

impl LoginGate {
    pub fn new(uid: Uid, protocol: ProtocolContext) -> Self {
        Self { uid, alias: None, protocol, login_sent: false }
    }

    /// Log in under a server-issued alias instead of the bare uid.
    pub fn with_alias(uid: Uid, alias: Uid, protocol: ProtocolContext) -> Self {
        Self { uid, alias: Some(alias), protocol, login_sent: false }
    }

    /// Next write carries a fresh login frame, e.g. after a reconnect.
    pub fn relogin(&mut self) {
        self.login_sent = false;
    }

    fn frame_login(&self, payload: &Bytes) -> Bytes {
        let mut packer = Packer::new();
        match self.alias {
            Some(alias) => {
                packer.write_message_id(LOGIN_BY_ALIAS);
                alias.pack(&mut packer);
            }
            None => {
                packer.write_message_id(LOGIN_BY_UID);
                self.uid.pack(&mut packer);
            }
        }
        payload.pack(&mut packer);
        packer.into_bytes()
    }
}

impl Gate for LoginGate {
    fn write_in(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
        if self.login_sent {
            return Ok(data);
        }
        debug!(uid = %self.uid, "framing first write as login");
        self.login_sent = true;
        Ok(self.frame_login(&data))
    }

    fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
        let mut api = ClientRootApi::new();
        let mut parser = ApiParser::new(self.protocol.clone(), &data);
        if let Err(err) = parser.parse(&mut api) {
            warn!(?err, "unparseable server packet");
            return None;
        }
        match api.payloads.len() {
            0 => None,
            1 => Some(api.payloads.remove(0)),
            _ => {
                // several relayed datagrams in one packet: deliver joined
                let mut joined = Vec::new();
                for payload in &api.payloads {
                    joined.extend_from_slice(payload);
                }
                Some(Bytes::from(joined))
            }
        }
    }

    fn overhead(&self) -> usize {
        // message id + uid + worst-case payload length prefix
        1 + 16 + 4
    }
}
