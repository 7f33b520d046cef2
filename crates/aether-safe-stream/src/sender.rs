use aether_actions::ActionContext;
use aether_codec::RequestId;
use aether_timing::Instant;
use bytes::Bytes;
use strum::Display;
use tracing::{debug, warn};

use crate::{
    config::SafeStreamConfig,
    ring_index::SsRingIndex,
    send_buffer::{SendDataBuffer, SendingDataPtr},
    sending_chunks::SendingChunkList,
    types::{DataMessage, OffsetRange, SafeStreamInit},
    wire::Outbox,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Init,
    WaitInitAck,
    Initiated,
    ReInit,
}

/// Send half of a Safe Stream session.
///
/// Owns the payload buffer and the transmitted-chunk bookkeeping. Driven by
/// `tick`; wire input arrives through the `on_*` handlers. Invariants:
/// `begin ≤ last_sent ≤ last_added` in ring order and
/// `last_sent − begin ≤ effective window`.
pub struct SenderHalf {
    config: SafeStreamConfig,
    state: SenderState,

    begin: SsRingIndex,
    last_sent: SsRingIndex,
    last_added: SsRingIndex,

    window_size: u16,
    max_packet_size: u16,
    max_payload: usize,

    init_request_id: RequestId,
    init_repeat_count: u16,
    init_sent_at: Option<Instant>,
    reset_pending: bool,

    buffer: SendDataBuffer,
    chunks: SendingChunkList,
}

impl SenderHalf {
    pub fn new(actions: ActionContext, config: SafeStreamConfig) -> Self {
        Self {
            config,
            state: SenderState::Init,
            begin: SsRingIndex::ZERO,
            last_sent: SsRingIndex::ZERO,
            last_added: SsRingIndex::ZERO,
            window_size: config.window_size,
            max_packet_size: config.max_packet_size,
            max_payload: usize::MAX,
            init_request_id: RequestId::generate(),
            init_repeat_count: 0,
            init_sent_at: None,
            reset_pending: true,
            buffer: SendDataBuffer::new(actions),
            chunks: SendingChunkList::new(),
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn begin(&self) -> SsRingIndex {
        self.begin
    }

    pub fn last_sent(&self) -> SsRingIndex {
        self.last_sent
    }

    pub fn in_flight(&self) -> u16 {
        self.begin.distance_to(self.last_sent)
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.pending_bytes()
    }

    /// Downstream per-datagram payload budget, set from stream updates.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    /// Queue a payload. Nothing hits the wire before the session is
    /// initiated; the returned action resolves on full acknowledgement.
    pub fn send_data(&mut self, data: Bytes) -> SendingDataPtr {
        let len = data.len() as u16;
        let ptr = self.buffer.add(self.last_added, data);
        self.last_added += len;
        ptr
    }

    fn effective_window(&self) -> u16 {
        self.window_size.min(self.config.buffer_capacity)
    }

    fn effective_packet(&self) -> usize {
        (self.max_packet_size as usize).min(self.max_payload).max(1)
    }

    fn offered_init(&self) -> SafeStreamInit {
        SafeStreamInit {
            offset: self.begin.0,
            window_size: self.config.window_size,
            max_packet_size: self.config.max_packet_size,
        }
    }

    pub fn tick(&mut self, now: Instant, out: &mut Outbox) -> Option<Instant> {
        match self.state {
            SenderState::Init | SenderState::ReInit => {
                if self.state == SenderState::ReInit {
                    self.init_request_id = RequestId::generate();
                    self.init_repeat_count = 0;
                    self.reset_pending = true;
                }
                self.emit_init(now, out);
                Some(self.init_deadline())
            }
            SenderState::WaitInitAck => {
                if now >= self.init_deadline() {
                    self.init_repeat_count += 1;
                    self.emit_init(now, out);
                }
                Some(self.init_deadline())
            }
            SenderState::Initiated => self.tick_initiated(now, out),
        }
    }

    fn emit_init(&mut self, now: Instant, out: &mut Outbox) {
        debug!(
            request_id = %self.init_request_id,
            repeat = self.init_repeat_count,
            offset = %self.begin,
            "sending init"
        );
        out.init(self.init_request_id, self.init_repeat_count, self.offered_init());
        self.init_sent_at = Some(now);
        self.state = SenderState::WaitInitAck;
    }

    fn init_deadline(&self) -> Instant {
        let sent = self.init_sent_at.unwrap_or(Instant::ZERO);
        sent + self.config.repeat_timeout(self.init_repeat_count.min(255) as u8)
    }

    fn tick_initiated(&mut self, now: Instant, out: &mut Outbox) -> Option<Instant> {
        // fresh data while the window has room; a slice never overshoots it
        while self.in_flight() < self.effective_window() && self.last_sent != self.last_added {
            let room = (self.effective_window() - self.in_flight()) as usize;
            let max_len = self.effective_packet().min(room);
            let Some(chunk) = self.buffer.slice(self.last_sent, max_len) else {
                break;
            };
            let len = chunk.data.len() as u16;
            self.chunks.register(OffsetRange::with_len(chunk.offset, len), now);
            out.data(&DataMessage {
                repeat_count: 0,
                reset: std::mem::take(&mut self.reset_pending),
                offset: chunk.offset,
                data: chunk.data,
            });
            self.last_sent += len;
        }

        // retransmissions and budget exhaustion
        let mut next: Option<Instant> = None;
        let mut failed: Vec<OffsetRange> = Vec::new();
        for chunk in self.chunks.iter_mut() {
            let deadline = chunk.send_time + self.config.repeat_timeout(chunk.repeat_count);
            if chunk.forced || now >= deadline {
                if chunk.repeat_count >= self.config.max_repeat_count {
                    failed.push(chunk.range);
                    continue;
                }
                chunk.repeat_count += 1;
                chunk.send_time = now;
                chunk.forced = false;
                if let Some(slice) = self.buffer.slice(chunk.range.left, chunk.range.len()) {
                    debug!(offset = %slice.offset, repeat = chunk.repeat_count, "retransmit");
                    out.data(&DataMessage {
                        repeat_count: chunk.repeat_count,
                        reset: false,
                        offset: slice.offset,
                        data: slice.data,
                    });
                }
                next = min_deadline(
                    next,
                    now + self.config.repeat_timeout(chunk.repeat_count),
                );
            } else {
                next = min_deadline(next, deadline);
            }
        }

        for range in &failed {
            warn!(left = %range.left, right = %range.right, "retransmission budget exhausted");
            self.buffer.fail_overlapping(*range);
            if range.left == self.begin {
                self.begin = range.right.next();
            }
        }
        if !failed.is_empty() {
            self.chunks.retain(|chunk| !failed.contains(&chunk.range));
        }

        next
    }

    pub fn on_init_ack(&mut self, request_id: RequestId, init: SafeStreamInit) {
        if request_id != self.init_request_id {
            debug!(%request_id, "init ack for an unknown request");
            return;
        }
        if self.state != SenderState::WaitInitAck {
            return;
        }
        if init.offset != self.begin.0 {
            warn!(acked = init.offset, ours = %self.begin, "init ack offset mismatch");
            self.state = SenderState::ReInit;
            return;
        }
        self.window_size = self.config.window_size.min(init.window_size);
        self.max_packet_size = self.config.max_packet_size.min(init.max_packet_size);
        self.state = SenderState::Initiated;
        debug!(window = self.window_size, packet = self.max_packet_size, "session initiated");
    }

    /// Cumulative ack: every byte up to and including `offset` arrived.
    pub fn on_confirm(&mut self, offset: SsRingIndex) {
        let valid = (offset == self.begin || self.begin.is_before(offset))
            && offset.is_before(self.last_sent);
        if !valid {
            debug!(%offset, begin = %self.begin, "stale confirm ignored");
            return;
        }

        self.buffer.acknowledge(offset);
        self.chunks.remove_up_to(offset);
        self.begin = offset.next();

        // a valid confirm doubles as an init ack when ours went missing
        if self.state == SenderState::WaitInitAck {
            self.state = SenderState::Initiated;
        }
    }

    /// Peer is missing `offset`: retransmit its chunk on the next pass.
    pub fn on_request_repeat(&mut self, offset: SsRingIndex) {
        if !self.chunks.expire_at(offset) {
            debug!(%offset, "repeat requested for an unknown chunk");
        }
    }
}

fn min_deadline(current: Option<Instant>, candidate: Instant) -> Option<Instant> {
    Some(current.map_or(candidate, |t| t.min(candidate)))
}
