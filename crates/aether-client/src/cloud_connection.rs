use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use aether_actions::ActionContext;
use aether_events::{Event, Subscription, SubscriptionSet};
use aether_streams::{SplitStream, StreamHandle, StreamId};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    message_stream::MessageStream,
    p2p::SplitStreamConnection,
    server_connection::ClientServerConnection,
    uid::Uid,
};

/// Supplies server sessions of one cloud, in preference order.
///
/// `connect` may fail for an individual server (unreachable, resolution
/// pending); the cloud connection then tries the next index.
pub trait ServerConnectionProvider {
    fn connection_count(&self) -> usize;
    fn connect(&mut self, index: usize) -> Option<Rc<ClientServerConnection>>;
}

struct CloudInner {
    actions: ActionContext,
    provider: Box<dyn ServerConnectionProvider>,
    current_index: usize,
    current: Option<Rc<ClientServerConnection>>,
    splitters: IndexMap<Uid, SplitStreamConnection>,
    new_stream_event: Event<(Uid, StreamId, Rc<RefCell<SplitStream>>)>,
    error_sub: Subscription,
    peer_stream_sub: Subscription,
    splitter_subs: SubscriptionSet,
}

/// Per-peer split streams over whichever server of the cloud is alive.
///
/// Holds one [`ClientServerConnection`] at a time. When its keepalive
/// reports the server dead, the next provider entry takes over and every
/// peer splitter is relinked onto the fresh session; Safe Stream
/// retransmission carries unacknowledged data across the switch.
pub struct ClientCloudConnection {
    inner: Rc<RefCell<CloudInner>>,
}

impl ClientCloudConnection {
    pub fn new(actions: ActionContext, provider: Box<dyn ServerConnectionProvider>) -> Self {
        let connection = Self {
            inner: Rc::new(RefCell::new(CloudInner {
                actions,
                provider,
                current_index: 0,
                current: None,
                splitters: IndexMap::new(),
                new_stream_event: Event::new(),
                error_sub: Subscription::none(),
                peer_stream_sub: Subscription::none(),
                splitter_subs: SubscriptionSet::new(),
            })),
        };
        Self::select_connection(&connection.inner);
        connection
    }

    /// Fires for peer-initiated logical streams:
    /// `(peer uid, stream id, stream)`.
    pub fn new_stream_event(&self) -> Event<(Uid, StreamId, Rc<RefCell<SplitStream>>)> {
        self.inner.borrow().new_stream_event.clone()
    }

    /// Open a logical stream to `uid`.
    pub fn create_stream(&self, uid: Uid) -> Option<(StreamId, Rc<RefCell<SplitStream>>)> {
        Self::ensure_splitter(&self.inner, uid)?;
        let inner = self.inner.borrow();
        inner.splitters.get(&uid).map(SplitStreamConnection::create_stream)
    }

    pub fn close_stream(&self, uid: Uid, stream_id: StreamId) {
        let inner = self.inner.borrow();
        if let Some(splitter) = inner.splitters.get(&uid) {
            splitter.close_stream(stream_id);
        }
    }

    pub fn current_server_index(&self) -> Option<usize> {
        let inner = self.inner.borrow();
        inner.current.as_ref().map(|_| inner.current_index)
    }

    fn select_connection(inner_rc: &Rc<RefCell<CloudInner>>) {
        let connection = {
            let mut inner = inner_rc.borrow_mut();
            if let Some(old) = inner.current.take() {
                old.stop();
            }

            let count = inner.provider.connection_count();
            if count == 0 {
                warn!("cloud has no servers to connect to");
                return;
            }

            let mut picked = None;
            for attempt in 0..count {
                let index = (inner.current_index + attempt) % count;
                if let Some(connection) = inner.provider.connect(index) {
                    inner.current_index = index;
                    picked = Some(connection);
                    break;
                }
            }
            let Some(connection) = picked else {
                warn!("no server of the cloud accepted a connection");
                return;
            };

            debug!(index = inner.current_index, "server connection selected");
            inner.current = Some(connection.clone());
            connection
        };

        // wire the fail-over and peer-stream forwarding, then relink the
        // existing peer splitters onto the fresh session
        let weak = Rc::downgrade(inner_rc);
        let error_sub = connection.error_event().subscribe(move |()| {
            Self::reconnect(&weak);
        });

        let weak = Rc::downgrade(inner_rc);
        let peer_stream_sub = connection.new_stream_event().subscribe(
            move |(uid, _stream): &(Uid, Rc<RefCell<MessageStream>>)| {
                if let Some(inner_rc) = weak.upgrade() {
                    Self::ensure_splitter(&inner_rc, *uid);
                }
            },
        );

        let mut inner = inner_rc.borrow_mut();
        inner.error_sub = error_sub;
        inner.peer_stream_sub = peer_stream_sub;

        let uids: Vec<Uid> = inner.splitters.keys().copied().collect();
        for uid in uids {
            let message_stream: StreamHandle = connection.message_stream(uid);
            if let Some(splitter) = inner.splitters.get(&uid) {
                splitter.relink(message_stream);
            }
        }
    }

    fn reconnect(weak: &Weak<RefCell<CloudInner>>) {
        let Some(inner_rc) = weak.upgrade() else {
            return;
        };
        {
            let mut inner = inner_rc.borrow_mut();
            let count = inner.provider.connection_count().max(1);
            inner.current_index = (inner.current_index + 1) % count;
            warn!(next = inner.current_index, "failing over to the next server");
        }
        Self::select_connection(&inner_rc);
    }

    /// Make sure a splitter over `uid`'s message stream exists; forwards
    /// its peer-opened streams to the cloud-level event.
    fn ensure_splitter(inner_rc: &Rc<RefCell<CloudInner>>, uid: Uid) -> Option<()> {
        {
            let inner = inner_rc.borrow();
            if inner.splitters.contains_key(&uid) {
                return Some(());
            }
            inner.current.as_ref()?;
        }

        let (actions, connection) = {
            let inner = inner_rc.borrow();
            (inner.actions.clone(), inner.current.clone()?)
        };
        let message_stream: StreamHandle = connection.message_stream(uid);
        let splitter = SplitStreamConnection::new(actions, message_stream);

        let forward = inner_rc.borrow().new_stream_event.clone();
        let sub = splitter.new_stream_event().subscribe(
            move |(stream_id, stream): &(StreamId, Rc<RefCell<SplitStream>>)| {
                forward.emit(&(uid, *stream_id, stream.clone()));
            },
        );

        let mut inner = inner_rc.borrow_mut();
        inner.splitter_subs.push(sub);
        inner.splitters.insert(uid, splitter);
        Some(())
    }
}
