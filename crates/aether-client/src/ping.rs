use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use aether_actions::{ActionBehavior, StateMachine, UpdateCtl, UpdateStatus};
use aether_codec::RequestId;
use aether_events::SubscriptionSet;
use aether_streams::StreamError;
use aether_timing::{Duration, Instant};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client_to_server::ClientToServerStream;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PingConfig {
    pub interval: Duration,
    /// Consecutive unanswered pings before the connection counts as dead.
    pub max_repeat_count: u8,
    /// Response deadline until enough round trips are measured.
    pub base_response_timeout: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_repeat_count: 5,
            base_response_timeout: Duration::from_millis(300),
        }
    }
}

/// Windowed round-trip samples for one server channel.
#[derive(Debug)]
pub struct RttStatistics {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl RttStatistics {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn add(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn median(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }

    pub fn min(&self) -> Option<Duration> {
        self.samples.iter().copied().min()
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().copied().max()
    }

    /// Deadline for the next response: twice the median round trip, or the
    /// configured base while the window is still empty.
    pub fn response_timeout(&self, base: Duration) -> Duration {
        self.median().map_or(base, |median| (median * 2).max(Duration::from_millis(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PingState {
    SendPing,
    WaitResponse,
    WaitInterval,
    Stopped,
}

/// Keepalive over the authorized api.
///
/// A pong resets the failure counter and feeds the RTT statistic;
/// `max_repeat_count` consecutive timeouts terminate the action with
/// `ConnectionLost`.
pub struct PingBehavior {
    connection: Rc<ClientToServerStream>,
    config: PingConfig,

    state: StateMachine<PingState>,
    repeat_count: u8,
    last_ping_at: Instant,
    history_cap: usize,
    sent_pings: VecDeque<(RequestId, Instant)>,
    stats: RttStatistics,

    pongs: Rc<RefCell<Vec<RequestId>>>,
    subs: SubscriptionSet,
}

impl PingBehavior {
    pub fn new(connection: Rc<ClientToServerStream>, config: PingConfig) -> Self {
        let store = usize::from(config.max_repeat_count) * 2;
        Self {
            connection,
            config,
            state: StateMachine::new(PingState::SendPing),
            repeat_count: 0,
            last_ping_at: Instant::ZERO,
            history_cap: store,
            sent_pings: VecDeque::with_capacity(store),
            stats: RttStatistics::new(store),
            pongs: Rc::new(RefCell::new(Vec::new())),
            subs: SubscriptionSet::new(),
        }
    }

    pub fn stop(&mut self) {
        self.state.set(PingState::Stopped);
    }

    pub fn statistics(&self) -> &RttStatistics {
        &self.stats
    }

    fn send_ping(&mut self, now: Instant) {
        let promise = self.connection.ping(self.config.interval.as_millis_u64());
        let request_id = promise.peek(|pending| pending.request_id());
        debug!(%request_id, repeat = self.repeat_count, "ping");

        if self.sent_pings.len() >= self.history_cap {
            self.sent_pings.pop_front();
        }
        self.sent_pings.push_back((request_id, now));

        let pongs = self.pongs.clone();
        self.subs.push(
            promise
                .result_event()
                .subscribe(move |()| pongs.borrow_mut().push(request_id))
                .once(),
        );

        self.last_ping_at = now;
        self.state.set(PingState::WaitResponse);
    }

    fn drain_pongs(&mut self, now: Instant) {
        let pongs = std::mem::take(&mut *self.pongs.borrow_mut());
        for request_id in pongs {
            let Some(&(_, sent_at)) =
                self.sent_pings.iter().find(|(id, _)| *id == request_id)
            else {
                debug!(%request_id, "pong for a forgotten ping");
                continue;
            };
            let rtt = now - sent_at;
            self.stats.add(rtt);
            self.repeat_count = 0;
            if self.state.get() == PingState::WaitResponse {
                self.state.set(PingState::WaitInterval);
            }
        }
    }

    fn check_response(&mut self, now: Instant, ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        let timeout = self.stats.response_timeout(self.config.base_response_timeout);
        let deadline = self.last_ping_at + timeout;
        if now < deadline {
            return UpdateStatus::Delay(deadline);
        }

        if self.repeat_count >= self.config.max_repeat_count {
            warn!(repeats = self.repeat_count, "server stopped answering pings");
            return UpdateStatus::Error(StreamError::ConnectionLost);
        }
        self.repeat_count += 1;
        self.state.set(PingState::SendPing);
        ctl.trigger();
        UpdateStatus::Continue
    }

    fn check_interval(&mut self, now: Instant, ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        let deadline = self.last_ping_at + self.config.interval;
        if now < deadline {
            return UpdateStatus::Delay(deadline);
        }
        self.state.set(PingState::SendPing);
        ctl.trigger();
        UpdateStatus::Continue
    }
}

impl ActionBehavior for PingBehavior {
    type Output = ();
    type Error = StreamError;

    fn update(&mut self, now: Instant, ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        self.drain_pongs(now);

        if self.state.changed() {
            match self.state.acquire() {
                PingState::SendPing => self.send_ping(now),
                PingState::WaitResponse | PingState::WaitInterval => {}
                PingState::Stopped => return UpdateStatus::Stop,
            }
        }

        match self.state.get() {
            PingState::WaitResponse => self.check_response(now, ctl),
            PingState::WaitInterval => self.check_interval(now, ctl),
            _ => UpdateStatus::Continue,
        }
    }
}
