use std::{cell::RefCell, rc::Rc};

use aether_actions::{ActionBehavior, ActionContext, ActionPtr, UpdateCtl, UpdateStatus};
use aether_codec::{ApiParser, ProtocolContext, RequestId};
use aether_events::{Event, Subscription, SubscriptionSet};
use aether_streams::{
    ByteStream, LinkStream, StreamError, StreamHandle, StreamInfo, WriteBehavior, WriteHandle,
};
use aether_timing::Instant;
use bytes::Bytes;
use tracing::warn;

use crate::{
    config::SafeStreamConfig,
    receiver::ReceiverHalf,
    ring_index::SsRingIndex,
    sender::SenderHalf,
    types::{DataMessage, SafeStreamInit},
    wire::{Outbox, SafeStreamApi, SafeStreamEvents, SafeStreamWire},
};

/// One byte less than half the ring: the most data that may sit
/// unacknowledged without breaking ring-order comparisons.
const RING_CAPACITY: usize = (1 << 15) - 1;

/// The actor driving both Safe Stream halves.
///
/// One scheduler action owns the sender and receiver state machines; wire
/// input is routed in through the owning [`SafeStream`]'s subscription and
/// wire output drains to the downstream link after every tick.
pub struct SafeStreamCore {
    pub(crate) sender: SenderHalf,
    pub(crate) receiver: ReceiverHalf,
    outbox: Outbox,
    downstream: Option<StreamHandle>,
}

impl ActionBehavior for SafeStreamCore {
    type Output = ();
    type Error = StreamError;

    fn update(&mut self, now: Instant, _ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        let send_deadline = self.sender.tick(now, &mut self.outbox);
        let recv_deadline = self.receiver.tick(now, &mut self.outbox);

        if let Some(downstream) = &self.downstream {
            for packet in self.outbox.take() {
                downstream.borrow_mut().write(packet);
            }
        }

        let next = match (send_deadline, recv_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        };
        match next {
            Some(at) => UpdateStatus::Delay(at),
            None => UpdateStatus::Continue,
        }
    }
}

struct Router<'a> {
    core: &'a ActionPtr<SafeStreamCore>,
}

impl SafeStreamEvents for Router<'_> {
    fn on_init(&mut self, request_id: RequestId, repeat_count: u16, init: SafeStreamInit) {
        self.core.with(|core| core.receiver.on_init(request_id, repeat_count, init));
    }

    fn on_init_ack(&mut self, request_id: RequestId, init: SafeStreamInit) {
        self.core.with(|core| core.sender.on_init_ack(request_id, init));
    }

    fn on_confirm(&mut self, offset: SsRingIndex) {
        self.core.with(|core| core.sender.on_confirm(offset));
    }

    fn on_request_repeat(&mut self, offset: SsRingIndex) {
        self.core.with(|core| core.sender.on_request_repeat(offset));
    }

    fn on_data(&mut self, message: DataMessage) {
        self.core.with(|core| core.receiver.push_data(message));
    }
}

/// Reliable, in-order byte stream over an unreliable datagram link.
///
/// Writes are chunked to the negotiated packet size, retransmitted until
/// acknowledged and delivered to the peer in submission order. The returned
/// write action resolves once the whole payload is acknowledged.
pub struct SafeStream {
    actions: ActionContext,
    core: ActionPtr<SafeStreamCore>,
    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
    session_reset_event: Event<()>,
    out_data_sub: Subscription,
    update_sub: Subscription,
    write_subs: SubscriptionSet,
}

impl SafeStream {
    pub fn new(actions: ActionContext, config: SafeStreamConfig) -> Rc<RefCell<Self>> {
        let core = actions.spawn(SafeStreamCore {
            sender: SenderHalf::new(actions.clone(), config),
            receiver: ReceiverHalf::new(config),
            outbox: Outbox::new(),
            downstream: None,
        });
        Rc::new(RefCell::new(Self {
            actions,
            core,
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
            session_reset_event: Event::new(),
            out_data_sub: Subscription::none(),
            update_sub: Subscription::none(),
            write_subs: SubscriptionSet::new(),
        }))
    }

    /// Fires when the peer abandons the current session and starts a new
    /// one; buffered but unemitted data from the old session is gone.
    pub fn session_reset_event(&self) -> Event<()> {
        self.session_reset_event.clone()
    }

    fn apply_downstream_budget(&self, downstream: &StreamHandle) {
        let info = downstream.borrow().stream_info();
        let budget =
            info.max_element_size.saturating_sub(SafeStreamWire::data_overhead(info.max_element_size));
        self.core.with(|core| core.sender.set_max_payload(budget.max(1)));
    }
}

impl ByteStream for SafeStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        if data.is_empty() {
            return WriteBehavior::done(&self.actions);
        }
        let pending = self.core.peek(|core| core.sender.pending_bytes());
        if pending + data.len() > RING_CAPACITY {
            return WriteBehavior::failed(
                &self.actions,
                StreamError::WriteTooLarge { size: data.len(), max: RING_CAPACITY - pending },
            );
        }

        let Some(sending) = self.core.with(|core| core.sender.send_data(data)) else {
            return WriteBehavior::failed(&self.actions, StreamError::Canceled);
        };

        let write = WriteBehavior::pending(&self.actions);
        let done = write.clone();
        self.write_subs
            .push(sending.result_event().subscribe(move |()| {
                done.with(WriteBehavior::complete);
            })
            .once());
        let failed = write.clone();
        self.write_subs
            .push(sending.error_event().subscribe(move |err: &StreamError| {
                let err = *err;
                failed.with(|b| b.fail(err));
            })
            .once());
        let stopped = write.clone();
        self.write_subs
            .push(sending.stop_event().subscribe(move |()| {
                stopped.with(WriteBehavior::stopped);
            })
            .once());
        write
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        let downstream = self.core.peek(|core| core.downstream.clone());
        let Some(downstream) = downstream else {
            return StreamInfo::default();
        };
        let info = downstream.borrow().stream_info();
        StreamInfo {
            rec_element_size: info.rec_element_size,
            // payloads are chunked internally, only the ring bounds a write
            max_element_size: RING_CAPACITY,
            is_reliable: true,
            link_state: info.link_state,
            is_writable: info.is_writable,
        }
    }
}

impl LinkStream for SafeStream {
    fn link_out(&mut self, downstream: StreamHandle) {
        let core = self.core.clone();
        let out_event = self.out_data_event.clone();
        let reset_event = self.session_reset_event.clone();
        self.out_data_sub = downstream.borrow().out_data_event().subscribe(move |data: &Bytes| {
            let mut router = Router { core: &core };
            let mut parser = ApiParser::new(ProtocolContext::new(), data);
            if let Err(err) = parser.parse(&mut SafeStreamApi { events: &mut router }) {
                warn!(?err, "dropping unparseable safe stream packet");
            }

            let drained = core.with(|c| (c.receiver.take_ready(), c.receiver.take_session_reset()));
            let (ready, reset) = drained.unwrap_or_default();
            if reset {
                reset_event.notify();
            }
            for payload in ready {
                out_event.emit(&payload);
            }
        });

        let core = self.core.clone();
        let update_event = self.stream_update_event.clone();
        let budget_target = downstream.clone();
        self.update_sub = downstream.borrow().stream_update_event().subscribe(move |()| {
            let info = budget_target.borrow().stream_info();
            let budget = info
                .max_element_size
                .saturating_sub(SafeStreamWire::data_overhead(info.max_element_size));
            core.with(|c| c.sender.set_max_payload(budget.max(1)));
            update_event.notify();
        });

        self.apply_downstream_budget(&downstream);
        self.core.with(|core| core.downstream = Some(downstream));
        self.stream_update_event.notify();
    }

    fn unlink(&mut self) {
        self.core.with(|core| core.downstream = None);
        self.out_data_sub.reset();
        self.update_sub.reset();
        self.stream_update_event.notify();
    }
}
