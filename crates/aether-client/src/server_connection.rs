use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionPtr;
use aether_events::{Event, Subscription};
use aether_streams::StreamError;
use tracing::warn;

use crate::{
    client_to_server::ClientToServerStream,
    message_stream::{MessageStream, MessageStreamDispatcher},
    ping::{PingBehavior, PingConfig},
    uid::Uid,
};

/// One live server session: the authenticated stream, the per-peer message
/// dispatcher and the keepalive.
///
/// A ping failure surfaces on `error_event`; the owner decides whether to
/// fail over to another server of the cloud.
pub struct ClientServerConnection {
    server_stream: Rc<ClientToServerStream>,
    dispatcher: MessageStreamDispatcher,
    ping: ActionPtr<PingBehavior>,
    error_event: Event<()>,
    _ping_error_sub: Subscription,
}

impl ClientServerConnection {
    pub fn new(server_stream: Rc<ClientToServerStream>, ping_config: PingConfig) -> Self {
        let actions = server_stream.actions();
        let dispatcher = MessageStreamDispatcher::new(server_stream.clone());
        let ping = actions.spawn(PingBehavior::new(server_stream.clone(), ping_config));

        let error_event = Event::new();
        let forward = error_event.clone();
        let ping_error_sub = ping.error_event().subscribe(move |err: &StreamError| {
            warn!(?err, "server connection went dark");
            forward.notify();
        });

        Self { server_stream, dispatcher, ping, error_event, _ping_error_sub: ping_error_sub }
    }

    pub fn server_stream(&self) -> Rc<ClientToServerStream> {
        self.server_stream.clone()
    }

    /// Message stream to `uid`, created on first use.
    pub fn message_stream(&self, uid: Uid) -> Rc<RefCell<MessageStream>> {
        self.dispatcher.message_stream(uid)
    }

    /// Fires when a peer opens a message stream towards us.
    pub fn new_stream_event(&self) -> Event<(Uid, Rc<RefCell<MessageStream>>)> {
        self.dispatcher.new_stream_event()
    }

    pub fn close_stream(&self, uid: Uid) {
        self.dispatcher.close_stream(uid);
    }

    /// The keepalive declared the server unreachable.
    pub fn error_event(&self) -> Event<()> {
        self.error_event.clone()
    }

    /// Stop the keepalive, e.g. when the connection is being replaced.
    pub fn stop(&self) {
        self.ping.with(PingBehavior::stop);
    }
}
