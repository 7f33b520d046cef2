use std::{cell::RefCell, rc::Rc};

use aether_codec::packed_size_len;
use aether_events::{Event, Subscription};
use aether_streams::{ByteStream, StreamInfo, WriteHandle};
use bytes::Bytes;
use indexmap::IndexMap;
use tracing::debug;

use crate::{client_to_server::ClientToServerStream, uid::Uid};

/// Byte stream to one peer, riding the server relay.
///
/// Writes wrap as `AuthorizedApi::send_message(destination, payload)`; the
/// dispatcher feeds inbound payloads from that peer into `out_data_event`.
pub struct MessageStream {
    connection: Rc<ClientToServerStream>,
    destination: Uid,
    out_data_event: Event<Bytes>,
}

impl MessageStream {
    fn new(connection: Rc<ClientToServerStream>, destination: Uid) -> Self {
        Self { connection, destination, out_data_event: Event::new() }
    }

    pub fn destination(&self) -> Uid {
        self.destination
    }
}

impl ByteStream for MessageStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        self.connection.send_message(self.destination, data)
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.connection.stream_update_event()
    }

    fn stream_info(&self) -> StreamInfo {
        let info = self.connection.stream_info();
        // message id + uid + worst-case payload length prefix
        let overhead = 1 + 16 + packed_size_len(info.max_element_size);
        info.minus_overhead(overhead)
    }
}

/// Routes relayed peer messages into per-uid [`MessageStream`]s.
///
/// Outbound streams are created on demand; data from an unknown peer
/// creates the stream and fires `new_stream_event` first.
pub struct MessageStreamDispatcher {
    connection: Rc<ClientToServerStream>,
    streams: Rc<RefCell<IndexMap<Uid, Rc<RefCell<MessageStream>>>>>,
    new_stream_event: Event<(Uid, Rc<RefCell<MessageStream>>)>,
    _route_sub: Subscription,
}

impl MessageStreamDispatcher {
    pub fn new(connection: Rc<ClientToServerStream>) -> Self {
        let streams: Rc<RefCell<IndexMap<Uid, Rc<RefCell<MessageStream>>>>> =
            Rc::new(RefCell::new(IndexMap::new()));
        let new_stream_event: Event<(Uid, Rc<RefCell<MessageStream>>)> = Event::new();

        let route_streams = streams.clone();
        let route_new = new_stream_event.clone();
        let route_connection = connection.clone();
        let route_sub =
            connection.send_message_event().subscribe(move |(uid, data): &(Uid, Bytes)| {
                let (stream, created) = {
                    let mut map = route_streams.borrow_mut();
                    match map.get(uid) {
                        Some(stream) => (stream.clone(), false),
                        None => {
                            debug!(%uid, "peer opened a message stream");
                            let stream = Rc::new(RefCell::new(MessageStream::new(
                                route_connection.clone(),
                                *uid,
                            )));
                            map.insert(*uid, stream.clone());
                            (stream, true)
                        }
                    }
                };
                if created {
                    route_new.emit(&(*uid, stream.clone()));
                }
                let out = stream.borrow().out_data_event.clone();
                out.emit(data);
            });

        Self { connection, streams, new_stream_event, _route_sub: route_sub }
    }

    pub fn new_stream_event(&self) -> Event<(Uid, Rc<RefCell<MessageStream>>)> {
        self.new_stream_event.clone()
    }

    /// Stream to `uid`, created on first use.
    pub fn message_stream(&self, uid: Uid) -> Rc<RefCell<MessageStream>> {
        let mut map = self.streams.borrow_mut();
        map.entry(uid)
            .or_insert_with(|| {
                Rc::new(RefCell::new(MessageStream::new(self.connection.clone(), uid)))
            })
            .clone()
    }

    pub fn close_stream(&self, uid: Uid) {
        self.streams.borrow_mut().shift_remove(&uid);
    }

    pub fn stream_count(&self) -> usize {
        self.streams.borrow().len()
    }
}
