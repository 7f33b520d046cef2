use aether_codec::RequestId;
use aether_timing::Instant;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    config::SafeStreamConfig,
    receiving_chunks::{AddResult, ReceiveChunkList},
    ring_index::SsRingIndex,
    types::{DataMessage, OffsetRange, SafeStreamInit},
    wire::Outbox,
};

/// Receive half of a Safe Stream session.
///
/// Buffers out-of-order chunks, emits the contiguous prefix in sender
/// order, acknowledges cumulatively and chases gaps with repeat requests.
/// Every buffered chunk stays inside `[begin, begin + window]`.
pub struct ReceiverHalf {
    config: SafeStreamConfig,

    session_begin: Option<SsRingIndex>,
    begin: SsRingIndex,
    window_size: u16,

    acked_init: Option<(RequestId, SafeStreamInit)>,
    pending_init_ack: Option<(RequestId, SafeStreamInit)>,
    chunks: ReceiveChunkList,

    /// Contiguous payloads emitted but not yet collected by the owner.
    ready: Vec<Bytes>,
    session_reset: bool,

    pending_ack: bool,
    ack_deadline: Option<Instant>,
    immediate_ack: bool,
    gap_since: Option<Instant>,
}

impl ReceiverHalf {
    pub fn new(config: SafeStreamConfig) -> Self {
        Self {
            config,
            session_begin: None,
            begin: SsRingIndex::ZERO,
            window_size: config.window_size,
            acked_init: None,
            pending_init_ack: None,
            chunks: ReceiveChunkList::new(),
            ready: Vec::new(),
            session_reset: false,
            pending_ack: false,
            ack_deadline: None,
            immediate_ack: false,
            gap_since: None,
        }
    }

    pub fn begin(&self) -> SsRingIndex {
        self.begin
    }

    pub fn session_begin(&self) -> Option<SsRingIndex> {
        self.session_begin
    }

    pub fn buffered_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Payloads emitted in order since the last call.
    pub fn take_ready(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.ready)
    }

    /// True once per peer-initiated session reset.
    pub fn take_session_reset(&mut self) -> bool {
        std::mem::take(&mut self.session_reset)
    }

    /// Administrative reset: drop buffered chunks and restart at
    /// `new_begin`.
    pub fn set_offset(&mut self, new_begin: SsRingIndex) {
        self.chunks.clear();
        self.session_begin = Some(new_begin);
        self.begin = new_begin;
        self.pending_ack = false;
        self.ack_deadline = None;
        self.immediate_ack = false;
        self.gap_since = None;
    }

    pub fn on_init(&mut self, request_id: RequestId, repeat_count: u16, init: SafeStreamInit) {
        if let Some((acked_id, acked)) = self.acked_init {
            if acked_id == request_id {
                // ack was lost; answering again is always safe
                debug!(%request_id, repeat = repeat_count, "re-acking duplicate init");
                self.immediate_init_ack(acked_id, acked);
                return;
            }
        }

        if self.session_begin.is_some() {
            warn!(offset = init.offset, "peer re-initiated, dropping session state");
            self.session_reset = true;
        }

        let negotiated = SafeStreamInit {
            offset: init.offset,
            window_size: self.config.window_size.min(init.window_size),
            max_packet_size: self.config.max_packet_size.min(init.max_packet_size),
        };
        self.set_offset(SsRingIndex(init.offset));
        self.window_size = negotiated.window_size;
        self.acked_init = Some((request_id, negotiated));
        self.immediate_init_ack(request_id, negotiated);
    }

    fn immediate_init_ack(&mut self, request_id: RequestId, init: SafeStreamInit) {
        // queued alongside data acks; flushed on the next tick
        self.pending_init_ack = Some((request_id, init));
    }

    pub fn push_data(&mut self, message: DataMessage) {
        if self.session_begin.is_none() {
            // implicit init from first data
            self.session_begin = Some(message.offset);
            self.begin = message.offset;
        }

        if message.data.is_empty() {
            return;
        }

        // already emitted in full: just re-ack
        let range = message.range();
        if range.is_before(self.begin) {
            self.immediate_ack = true;
            return;
        }

        let window = OffsetRange::new(self.begin, self.begin + self.window_size);
        if !window.in_range(message.offset) {
            if message.reset {
                warn!(offset = %message.offset, "reset data outside window, restarting session");
                self.session_reset = true;
                self.set_offset(message.offset);
            } else {
                debug!(offset = %message.offset, begin = %self.begin, "datagram outside window");
                self.immediate_ack = true;
                return;
            }
        }

        match self.chunks.add(message.offset, message.data) {
            AddResult::Duplicate => {
                self.immediate_ack = true;
            }
            AddResult::Added => {}
        }

        if let Some((joined, new_begin)) = self.chunks.take_contiguous(self.begin) {
            self.begin = new_begin;
            self.ready.push(joined);
            self.pending_ack = true;
            self.gap_since = None;
        }
    }

    pub fn tick(&mut self, now: Instant, out: &mut Outbox) -> Option<Instant> {
        if let Some((request_id, init)) = self.pending_init_ack.take() {
            out.init_ack(request_id, init);
        }

        self.session_begin?;

        let mut next: Option<Instant> = None;

        if self.immediate_ack {
            self.send_confirm(out);
        } else if self.pending_ack {
            let deadline = *self.ack_deadline.get_or_insert(now + self.config.send_confirm_timeout);
            if now >= deadline {
                self.send_confirm(out);
            } else {
                next = min_deadline(next, deadline);
            }
        }

        match self.chunks.first_missing(self.begin) {
            Some(missing) => {
                let since = *self.gap_since.get_or_insert(now);
                let deadline = since + self.config.send_repeat_timeout;
                if now >= deadline {
                    debug!(%missing, "requesting repeat");
                    out.request_repeat(missing);
                    self.gap_since = Some(now);
                    next = min_deadline(next, now + self.config.send_repeat_timeout);
                } else {
                    next = min_deadline(next, deadline);
                }
            }
            None => self.gap_since = None,
        }

        next
    }

    fn send_confirm(&mut self, out: &mut Outbox) {
        // everything before `begin` has been emitted, confirm its last byte
        out.confirm(self.begin.prev());
        self.immediate_ack = false;
        self.pending_ack = false;
        self.ack_deadline = None;
    }
}

fn min_deadline(current: Option<Instant>, candidate: Instant) -> Option<Instant> {
    Some(current.map_or(candidate, |t| t.min(candidate)))
}
