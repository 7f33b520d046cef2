use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionContext;
use aether_events::Event;
use aether_streams::{ByteStream, LinkState, StreamInfo, WriteBehavior, WriteHandle};
use bytes::Bytes;

/// Scriptable downstream: records writes, lets the test inject inbound
/// datagrams and change the advertised stream info.
pub struct MockStream {
    actions: ActionContext,
    written: Rc<RefCell<Vec<Bytes>>>,
    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
    info: StreamInfo,
}

impl MockStream {
    pub fn new(actions: ActionContext, max_element_size: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            actions,
            written: Rc::new(RefCell::new(Vec::new())),
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
            info: StreamInfo {
                rec_element_size: max_element_size,
                max_element_size,
                is_reliable: false,
                link_state: LinkState::Linked,
                is_writable: true,
            },
        }))
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> Vec<Bytes> {
        self.written.borrow().clone()
    }

    pub fn written_count(&self) -> usize {
        self.written.borrow().len()
    }

    pub fn clear_written(&self) {
        self.written.borrow_mut().clear();
    }

    /// Deliver a datagram as if it arrived from the wire.
    pub fn inject(&self, data: Bytes) {
        self.out_data_event.emit(&data);
    }

    pub fn set_info(&mut self, info: StreamInfo) {
        self.info = info;
        self.stream_update_event.notify();
    }
}

impl ByteStream for MockStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        self.written.borrow_mut().push(data);
        WriteBehavior::done(&self.actions)
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        self.info
    }
}
