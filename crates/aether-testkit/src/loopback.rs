use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
};

use aether_actions::ActionContext;
use aether_events::Event;
use aether_streams::{ByteStream, LinkState, StreamInfo, WriteBehavior, WriteHandle};
use aether_timing::{Duration, Instant};
use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// What the link does with one datagram at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Deliver,
    Drop,
    Delay(Duration),
    Duplicate,
}

type FaultFn = Box<dyn FnMut(&Bytes) -> FaultAction>;

struct Parcel {
    data: Bytes,
    deliver_at: Option<Instant>,
}

struct Direction {
    queue: VecDeque<Parcel>,
    sent_log: Vec<Bytes>,
    fault: Option<FaultFn>,
}

impl Direction {
    fn new() -> Self {
        Self { queue: VecDeque::new(), sent_log: Vec::new(), fault: None }
    }
}

struct LinkInner {
    a_to_b: Direction,
    b_to_a: Direction,
}

/// In-memory datagram link between two [`LoopbackStream`] endpoints.
///
/// Writes enqueue; nothing reaches the peer until `pump` runs, so delivery
/// always happens outside any action's update call. Faults (drop, delay,
/// duplicate) are applied per datagram at pump time.
pub struct LoopbackLink {
    inner: Rc<RefCell<LinkInner>>,
    a: Rc<RefCell<LoopbackStream>>,
    b: Rc<RefCell<LoopbackStream>>,
}

impl LoopbackLink {
    pub fn new(actions: &ActionContext, max_element_size: usize) -> Self {
        let inner =
            Rc::new(RefCell::new(LinkInner { a_to_b: Direction::new(), b_to_a: Direction::new() }));
        let a = Rc::new(RefCell::new(LoopbackStream {
            actions: actions.clone(),
            link: inner.clone(),
            is_a: true,
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
            max_element_size,
        }));
        let b = Rc::new(RefCell::new(LoopbackStream {
            actions: actions.clone(),
            link: inner.clone(),
            is_a: false,
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
            max_element_size,
        }));
        Self { inner, a, b }
    }

    pub fn a(&self) -> Rc<RefCell<LoopbackStream>> {
        self.a.clone()
    }

    pub fn b(&self) -> Rc<RefCell<LoopbackStream>> {
        self.b.clone()
    }

    pub fn set_fault_a_to_b(&self, fault: impl FnMut(&Bytes) -> FaultAction + 'static) {
        self.inner.borrow_mut().a_to_b.fault = Some(Box::new(fault));
    }

    pub fn set_fault_b_to_a(&self, fault: impl FnMut(&Bytes) -> FaultAction + 'static) {
        self.inner.borrow_mut().b_to_a.fault = Some(Box::new(fault));
    }

    /// Every datagram side A ever wrote, before faults.
    pub fn sent_a_to_b(&self) -> Vec<Bytes> {
        self.inner.borrow().a_to_b.sent_log.clone()
    }

    pub fn sent_b_to_a(&self) -> Vec<Bytes> {
        self.inner.borrow().b_to_a.sent_log.clone()
    }

    /// Deliver everything due at `now`. Returns true if any datagram
    /// reached a peer.
    pub fn pump(&self, now: Instant) -> bool {
        self.pump_direction(now, true) | self.pump_direction(now, false)
    }

    fn pump_direction(&self, now: Instant, a_to_b: bool) -> bool {
        // decide and collect under the borrow, emit after releasing it
        let mut deliveries: Vec<Bytes> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let direction = if a_to_b { &mut inner.a_to_b } else { &mut inner.b_to_a };

            let mut keep: VecDeque<Parcel> = VecDeque::new();
            while let Some(parcel) = direction.queue.pop_front() {
                match parcel.deliver_at {
                    Some(at) if at > now => keep.push_back(parcel),
                    Some(_) => deliveries.push(parcel.data),
                    None => {
                        let action = direction
                            .fault
                            .as_mut()
                            .map_or(FaultAction::Deliver, |fault| fault(&parcel.data));
                        match action {
                            FaultAction::Deliver => deliveries.push(parcel.data),
                            FaultAction::Drop => {}
                            FaultAction::Delay(by) => keep
                                .push_back(Parcel { data: parcel.data, deliver_at: Some(now + by) }),
                            FaultAction::Duplicate => {
                                deliveries.push(parcel.data.clone());
                                deliveries.push(parcel.data);
                            }
                        }
                    }
                }
            }
            direction.queue = keep;
        }

        let receiver = if a_to_b { &self.b } else { &self.a };
        let event = receiver.borrow().out_data_event.clone();
        let delivered = !deliveries.is_empty();
        for data in deliveries {
            event.emit(&data);
        }
        delivered
    }

    /// Earliest pending delayed delivery, if any.
    pub fn next_delivery(&self) -> Option<Instant> {
        let inner = self.inner.borrow();
        inner
            .a_to_b
            .queue
            .iter()
            .chain(inner.b_to_a.queue.iter())
            .filter_map(|parcel| parcel.deliver_at)
            .min()
    }

    pub fn in_flight(&self) -> usize {
        let inner = self.inner.borrow();
        inner.a_to_b.queue.len() + inner.b_to_a.queue.len()
    }
}

/// One endpoint of a [`LoopbackLink`]; an unreliable datagram byte stream.
pub struct LoopbackStream {
    actions: ActionContext,
    link: Rc<RefCell<LinkInner>>,
    is_a: bool,
    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
    max_element_size: usize,
}

impl ByteStream for LoopbackStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        let mut link = self.link.borrow_mut();
        let direction = if self.is_a { &mut link.a_to_b } else { &mut link.b_to_a };
        direction.sent_log.push(data.clone());
        direction.queue.push_back(Parcel { data, deliver_at: None });
        WriteBehavior::done(&self.actions)
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            rec_element_size: self.max_element_size,
            max_element_size: self.max_element_size,
            is_reliable: false,
            link_state: LinkState::Linked,
            is_writable: true,
        }
    }
}

/// Fault closure delaying `fraction` of datagrams by up to `max_delay`,
/// deterministically from `seed`.
pub fn random_delay(
    seed: u64,
    fraction: f64,
    max_delay: Duration,
) -> impl FnMut(&Bytes) -> FaultAction {
    let mut rng = StdRng::seed_from_u64(seed);
    move |_data: &Bytes| {
        if rng.random::<f64>() < fraction {
            let nanos = rng.random_range(1..=max_delay.as_nanos());
            FaultAction::Delay(Duration::from_nanos(nanos))
        } else {
            FaultAction::Deliver
        }
    }
}

/// Fault closure dropping, duplicating and delaying datagrams at the given
/// rates, deterministically from `seed`.
pub fn unreliable(
    seed: u64,
    drop_rate: f64,
    duplicate_rate: f64,
    delay_rate: f64,
    max_delay: Duration,
) -> impl FnMut(&Bytes) -> FaultAction {
    let mut rng = StdRng::seed_from_u64(seed);
    move |_data: &Bytes| {
        let roll = rng.random::<f64>();
        if roll < drop_rate {
            FaultAction::Drop
        } else if roll < drop_rate + duplicate_rate {
            FaultAction::Duplicate
        } else if roll < drop_rate + duplicate_rate + delay_rate {
            let nanos = rng.random_range(1..=max_delay.as_nanos());
            FaultAction::Delay(Duration::from_nanos(nanos))
        } else {
            FaultAction::Deliver
        }
    }
}
