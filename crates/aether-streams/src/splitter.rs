use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU8, Ordering},
};

use aether_actions::ActionContext;
use aether_codec::{MessageId, Packer, Unpacker, packed_size_len};
use aether_events::{Event, Subscription};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::{ByteStream, StreamError, StreamHandle, StreamInfo, WriteBehavior, WriteHandle};

/// Logical stream identifier inside one physical stream.
pub type StreamId = u8;

/// `Stream(stream_id, payload)` message code.
pub const STREAM_MESSAGE: MessageId = 2;

static NEXT_CLIENT_STREAM_ID: AtomicU8 = AtomicU8::new(1);
static NEXT_SERVER_STREAM_ID: AtomicU8 = AtomicU8::new(2);

/// Client-initiated stream ids are odd; server-initiated even. Both advance
/// process-wide so initiators never collide.
pub fn next_client_stream_id() -> StreamId {
    NEXT_CLIENT_STREAM_ID.fetch_add(2, Ordering::Relaxed)
}

pub fn next_server_stream_id() -> StreamId {
    NEXT_SERVER_STREAM_ID.fetch_add(2, Ordering::Relaxed)
}

struct SplitterInner {
    actions: ActionContext,
    downstream: Option<StreamHandle>,
    streams: indexmap::IndexMap<StreamId, Rc<RefCell<SplitStream>>>,
    new_stream_event: Event<(StreamId, Rc<RefCell<SplitStream>>)>,
    stream_update_event: Event<()>,
    out_data_sub: Subscription,
    update_sub: Subscription,
}

/// Multiplexes logical byte streams over one physical stream.
///
/// Outbound writes from registered streams are wrapped as
/// `Stream(stream_id, payload)`; inbound messages route to the stream with
/// the matching id. Data for an unregistered id auto-registers it and fires
/// `new_stream_event`.
pub struct StreamSplitter {
    inner: Rc<RefCell<SplitterInner>>,
}

impl StreamSplitter {
    pub fn new(actions: ActionContext) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SplitterInner {
                actions,
                downstream: None,
                streams: indexmap::IndexMap::new(),
                new_stream_event: Event::new(),
                stream_update_event: Event::new(),
                out_data_sub: Subscription::none(),
                update_sub: Subscription::none(),
            })),
        }
    }

    pub fn link_out(&self, downstream: StreamHandle) {
        let weak = Rc::downgrade(&self.inner);
        let out_sub = downstream
            .borrow()
            .out_data_event()
            .subscribe(move |data: &Bytes| Self::on_downstream_data(&weak, data));

        let update_event = self.inner.borrow().stream_update_event.clone();
        let update_sub =
            downstream.borrow().stream_update_event().subscribe(move |()| update_event.notify());

        let mut inner = self.inner.borrow_mut();
        inner.out_data_sub = out_sub;
        inner.update_sub = update_sub;
        inner.downstream = Some(downstream);
        let update = inner.stream_update_event.clone();
        drop(inner);
        update.notify();
    }

    pub fn unlink(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.downstream = None;
        inner.out_data_sub.reset();
        inner.update_sub.reset();
        let update = inner.stream_update_event.clone();
        drop(inner);
        update.notify();
    }

    pub fn register_stream(&self, stream_id: StreamId) -> Rc<RefCell<SplitStream>> {
        let mut inner = self.inner.borrow_mut();
        if let Some(existing) = inner.streams.get(&stream_id) {
            return existing.clone();
        }
        let stream = Rc::new(RefCell::new(SplitStream {
            id: stream_id,
            splitter: Rc::downgrade(&self.inner),
            actions: inner.actions.clone(),
            out_data_event: Event::new(),
            stream_update_event: inner.stream_update_event.clone(),
            closed: false,
        }));
        inner.streams.insert(stream_id, stream.clone());
        stream
    }

    /// Unregister a logical stream. Its writes are rejected from here on;
    /// inbound data for the id registers a fresh stream.
    pub fn close_stream(&self, stream_id: StreamId) {
        let removed = self.inner.borrow_mut().streams.shift_remove(&stream_id);
        if let Some(stream) = removed {
            stream.borrow_mut().closed = true;
        }
    }

    pub fn new_stream_event(&self) -> Event<(StreamId, Rc<RefCell<SplitStream>>)> {
        self.inner.borrow().new_stream_event.clone()
    }

    pub fn stream_count(&self) -> usize {
        self.inner.borrow().streams.len()
    }

    fn on_downstream_data(weak: &Weak<RefCell<SplitterInner>>, data: &Bytes) {
        let Some(inner_rc) = weak.upgrade() else {
            return;
        };

        let mut unpacker = Unpacker::new(data);
        while !unpacker.is_empty() {
            let id = match unpacker.read_message_id() {
                Ok(id) => id,
                Err(err) => {
                    warn!(?err, "truncated splitter packet");
                    return;
                }
            };
            if id != STREAM_MESSAGE {
                warn!(id, "unknown message on split stream, dropping packet");
                return;
            }
            let header = match unpacker.read_u8() {
                Ok(stream_id) => unpacker.read_buffer().map(|payload| (stream_id, payload)),
                Err(err) => Err(err),
            };
            let (stream_id, payload) = match header {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(?err, "truncated stream message");
                    return;
                }
            };

            // resolve the route with the registry borrowed, emit without
            let (stream, new_event) = {
                let mut inner = inner_rc.borrow_mut();
                match inner.streams.get(&stream_id) {
                    Some(stream) => (stream.clone(), None),
                    None => {
                        debug!(stream_id, "auto-registering peer stream");
                        let stream = Rc::new(RefCell::new(SplitStream {
                            id: stream_id,
                            splitter: Rc::downgrade(&inner_rc),
                            actions: inner.actions.clone(),
                            out_data_event: Event::new(),
                            stream_update_event: inner.stream_update_event.clone(),
                            closed: false,
                        }));
                        inner.streams.insert(stream_id, stream.clone());
                        (stream, Some(inner.new_stream_event.clone()))
                    }
                }
            };

            if let Some(event) = new_event {
                event.emit(&(stream_id, stream.clone()));
            }
            let out_event = stream.borrow().out_data_event.clone();
            out_event.emit(&payload);
        }
    }
}

/// One logical stream handed out by a [`StreamSplitter`].
pub struct SplitStream {
    id: StreamId,
    splitter: Weak<RefCell<SplitterInner>>,
    actions: ActionContext,
    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
    closed: bool,
}

impl SplitStream {
    pub fn id(&self) -> StreamId {
        self.id
    }
}

impl ByteStream for SplitStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        if self.closed {
            return WriteBehavior::failed(&self.actions, StreamError::Canceled);
        }
        let Some(inner) = self.splitter.upgrade() else {
            return WriteBehavior::failed(&self.actions, StreamError::NotLinked);
        };
        let downstream = inner.borrow().downstream.clone();
        let Some(downstream) = downstream else {
            return WriteBehavior::failed(&self.actions, StreamError::NotLinked);
        };

        let mut packer = Packer::new();
        packer.write_message_id(STREAM_MESSAGE);
        packer.write_u8(self.id);
        packer.write_buffer(&data);
        downstream.borrow_mut().write(packer.into_bytes())
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        let Some(inner) = self.splitter.upgrade() else {
            return StreamInfo::default();
        };
        let downstream = inner.borrow().downstream.clone();
        let Some(downstream) = downstream else {
            return StreamInfo::default();
        };
        let info = downstream.borrow().stream_info();
        // message id + stream id + worst-case payload length prefix
        let overhead = 2 + packed_size_len(info.max_element_size);
        info.minus_overhead(overhead)
    }
}
