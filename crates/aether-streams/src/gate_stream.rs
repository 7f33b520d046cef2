use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionContext;
use aether_events::{Event, Subscription};
use bytes::Bytes;
use tracing::debug;

use crate::{
    ByteStream, Gate, LinkStream, StreamHandle, StreamInfo, WriteBehavior, WriteHandle,
};

/// Byte stream applying a gate (or tuple of gates) over a downstream.
///
/// Writes fold through the gates' `write_in` before reaching the
/// downstream; inbound buffers fold back through `write_out` and republish
/// on this stream's `out_data_event`. Element budgets shrink by the summed
/// gate overhead.
pub struct GateStream<G: Gate> {
    gate: Rc<RefCell<G>>,
    actions: ActionContext,
    downstream: Option<StreamHandle>,
    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
    out_data_sub: Subscription,
    update_sub: Subscription,
}

impl<G: Gate + 'static> GateStream<G> {
    pub fn new(actions: ActionContext, gate: G) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            gate: Rc::new(RefCell::new(gate)),
            actions,
            downstream: None,
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
            out_data_sub: Subscription::none(),
            update_sub: Subscription::none(),
        }))
    }

    /// Access the wrapped gate, e.g. to rotate keys on a crypto gate.
    pub fn gate(&self) -> Rc<RefCell<G>> {
        self.gate.clone()
    }
}

impl<G: Gate + 'static> ByteStream for GateStream<G> {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        let Some(downstream) = &self.downstream else {
            return WriteBehavior::failed(&self.actions, crate::StreamError::NotLinked);
        };

        let max = self.stream_info().max_element_size;
        if data.len() > max {
            return WriteBehavior::failed(
                &self.actions,
                crate::StreamError::WriteTooLarge { size: data.len(), max },
            );
        }

        match self.gate.borrow_mut().write_in(data) {
            Ok(folded) => downstream.borrow_mut().write(folded),
            Err(err) => WriteBehavior::failed(&self.actions, err),
        }
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        let Some(downstream) = &self.downstream else {
            return StreamInfo::default();
        };
        let overhead = self.gate.borrow().overhead();
        downstream.borrow().stream_info().minus_overhead(overhead)
    }
}

impl<G: Gate + 'static> LinkStream for GateStream<G> {
    fn link_out(&mut self, downstream: StreamHandle) {
        let gate = self.gate.clone();
        let out_event = self.out_data_event.clone();
        self.out_data_sub = downstream.borrow().out_data_event().subscribe(move |data: &Bytes| {
            match gate.borrow_mut().write_out(data.clone()) {
                Some(folded) => out_event.emit(&folded),
                None => debug!(len = data.len(), "gate swallowed inbound buffer"),
            }
        });

        let update_event = self.stream_update_event.clone();
        self.update_sub =
            downstream.borrow().stream_update_event().subscribe(move |()| update_event.notify());

        self.downstream = Some(downstream);
        self.stream_update_event.notify();
    }

    fn unlink(&mut self) {
        self.downstream = None;
        self.out_data_sub.reset();
        self.update_sub.reset();
        self.stream_update_event.notify();
    }
}
