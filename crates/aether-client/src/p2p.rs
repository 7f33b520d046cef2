use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionContext;
use aether_events::Event;
use aether_streams::{SplitStream, StreamHandle, StreamId, StreamSplitter, next_client_stream_id};

/// Multiple logical streams to one peer over its message stream.
///
/// Locally opened streams take client-parity (odd) ids; streams the peer
/// opens surface through `new_stream_event` with the peer's id.
pub struct SplitStreamConnection {
    splitter: StreamSplitter,
}

impl SplitStreamConnection {
    pub fn new(actions: ActionContext, message_stream: StreamHandle) -> Self {
        let splitter = StreamSplitter::new(actions);
        splitter.link_out(message_stream);
        Self { splitter }
    }

    /// Open a new locally-initiated stream.
    pub fn create_stream(&self) -> (StreamId, Rc<RefCell<SplitStream>>) {
        let stream_id = next_client_stream_id();
        (stream_id, self.splitter.register_stream(stream_id))
    }

    /// Move the splitter onto a fresh message stream, e.g. after the cloud
    /// connection failed over to another server.
    pub fn relink(&self, message_stream: StreamHandle) {
        self.splitter.link_out(message_stream);
    }

    /// Attach to a stream with a known id, e.g. one announced by the peer.
    pub fn open_stream(&self, stream_id: StreamId) -> Rc<RefCell<SplitStream>> {
        self.splitter.register_stream(stream_id)
    }

    pub fn close_stream(&self, stream_id: StreamId) {
        self.splitter.close_stream(stream_id);
    }

    pub fn new_stream_event(&self) -> Event<(StreamId, Rc<RefCell<SplitStream>>)> {
        self.splitter.new_stream_event()
    }

    pub fn stream_count(&self) -> usize {
        self.splitter.stream_count()
    }
}
