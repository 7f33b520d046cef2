use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionContext;
use aether_codec::{Packer, PromisePtr, ProtocolContext, RequestId, ReturnResultApi};
use aether_crypto::{CryptoGate, DecryptProvider, EncryptProvider};
use aether_events::{Event, Subscription};
use aether_safe_stream::{SafeStream, SafeStreamConfig};
use aether_streams::{
    ByteStream, GateStream, LinkStream, ProtocolReadGate, StreamHandle, StreamId, StreamInfo,
    WriteHandle,
};
use bytes::Bytes;

use crate::{
    apis::{AuthorizedApi, ClientSafeApi},
    login_gate::LoginGate,
    uid::Uid,
};

/// Authenticated, encrypted, reliable session with one work server.
///
/// Pipeline, top down: authorized api packets → safe stream → crypto gate →
/// login framer → datagram transport. Inbound safe-stream payloads parse as
/// [`ClientSafeApi`]; responses resolve promises registered on this
/// session's protocol context.
pub struct ClientToServerStream {
    actions: ActionContext,
    protocol: ProtocolContext,
    safe_stream: Rc<RefCell<SafeStream>>,
    gates: Rc<RefCell<GateStream<(LoginGate, CryptoGate)>>>,
    safe_api: Rc<RefCell<ClientSafeApi>>,
    _read_sub: Subscription,
}

impl ClientToServerStream {
    pub fn new(
        actions: ActionContext,
        uid: Uid,
        encrypt: Box<dyn EncryptProvider>,
        decrypt: Box<dyn DecryptProvider>,
        config: SafeStreamConfig,
    ) -> Self {
        let protocol = ProtocolContext::new();
        let gates = GateStream::new(
            actions.clone(),
            (LoginGate::new(uid, protocol.clone()), CryptoGate::new(encrypt, decrypt)),
        );
        let safe_stream = SafeStream::new(actions.clone(), config);
        {
            let downstream: StreamHandle = gates.clone();
            safe_stream.borrow_mut().link_out(downstream);
        }

        let safe_api = Rc::new(RefCell::new(ClientSafeApi::new()));
        let read_sub = ProtocolReadGate::subscribe(
            &*safe_stream.borrow(),
            protocol.clone(),
            safe_api.clone(),
        );

        Self { actions, protocol, safe_stream, gates, safe_api, _read_sub: read_sub }
    }

    /// Hook the session up to a datagram transport.
    pub fn link_transport(&self, transport: StreamHandle) {
        self.gates.borrow_mut().link_out(transport);
    }

    pub fn unlink_transport(&self) {
        self.gates.borrow_mut().unlink();
    }

    pub fn actions(&self) -> ActionContext {
        self.actions.clone()
    }

    pub fn protocol(&self) -> ProtocolContext {
        self.protocol.clone()
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.safe_stream.borrow().stream_info()
    }

    pub fn stream_update_event(&self) -> Event<()> {
        self.safe_stream.borrow().stream_update_event()
    }

    /// Round trip to the server; resolves when the pong arrives.
    pub fn ping(&self, next_ping_ms: u64) -> PromisePtr<()> {
        let request_id = RequestId::generate();
        let promise = ReturnResultApi::request::<()>(&self.actions, &self.protocol, request_id);

        let mut packer = Packer::new();
        AuthorizedApi::ping(&mut packer, request_id, next_ping_ms);
        self.safe_stream.borrow_mut().write(packer.into_bytes());
        promise
    }

    /// Relay an end-to-end payload to the peer `uid` through the server.
    pub fn send_message(&self, uid: Uid, data: Bytes) -> WriteHandle {
        let mut packer = Packer::new();
        AuthorizedApi::send_message(&mut packer, uid, &data);
        self.safe_stream.borrow_mut().write(packer.into_bytes())
    }

    pub fn check_access_for_send_message(&self, uid: Uid) -> PromisePtr<()> {
        let request_id = RequestId::generate();
        let promise = ReturnResultApi::request::<()>(&self.actions, &self.protocol, request_id);

        let mut packer = Packer::new();
        AuthorizedApi::check_access_for_send_message(&mut packer, request_id, uid);
        self.safe_stream.borrow_mut().write(packer.into_bytes());
        promise
    }

    /// Announce the stream ids resolver replies should use.
    pub fn resolvers(&self, servers_stream_id: StreamId, cloud_stream_id: StreamId) -> WriteHandle {
        let mut packer = Packer::new();
        AuthorizedApi::resolvers(&mut packer, servers_stream_id, cloud_stream_id);
        self.safe_stream.borrow_mut().write(packer.into_bytes())
    }

    /// Peer payload relayed by the server: `(sender uid, data)`.
    pub fn send_message_event(&self) -> Event<(Uid, Bytes)> {
        self.safe_api.borrow().send_message_event.clone()
    }

    /// Server-initiated logical stream announcement.
    pub fn stream_to_client_event(&self) -> Event<(Uid, StreamId)> {
        self.safe_api.borrow().stream_to_client_event.clone()
    }
}
