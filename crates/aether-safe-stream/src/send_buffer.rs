use aether_actions::{ActionBehavior, ActionContext, ActionPtr, UpdateCtl, UpdateStatus};
use aether_streams::StreamError;
use aether_timing::Instant;
use bytes::Bytes;

use crate::{
    ring_index::SsRingIndex,
    types::{DataChunk, OffsetRange},
};

/// One caller-submitted payload waiting for cumulative acknowledgement.
///
/// `Result` fires when every byte is acked; `Error(MaxRepeatExceeded)` when
/// any of its bytes exhausts the retransmission budget. A stopped action
/// keeps its bytes in the buffer so the stream stays gapless, but reports no
/// further terminal.
pub struct SendingDataBehavior {
    offset: SsRingIndex,
    data: Bytes,
    acked: usize,
    outcome: Option<Result<(), StreamError>>,
}

pub type SendingDataPtr = ActionPtr<SendingDataBehavior>;

impl SendingDataBehavior {
    fn new(offset: SsRingIndex, data: Bytes) -> Self {
        Self { offset, data, acked: 0, outcome: None }
    }

    pub fn range(&self) -> OffsetRange {
        OffsetRange::with_len(self.offset, self.data.len() as u16)
    }

    /// Apply a cumulative ack; returns true when fully acknowledged.
    fn acknowledge(&mut self, up_to: SsRingIndex) -> bool {
        let range = self.range();
        if range.is_after(up_to) {
            return false;
        }
        if range.is_before(up_to) || range.right == up_to {
            self.acked = self.data.len();
        } else {
            self.acked = self.acked.max(self.offset.distance_to(up_to) as usize + 1);
        }
        if self.acked == self.data.len() {
            self.outcome.get_or_insert(Ok(()));
            return true;
        }
        false
    }

    fn fail(&mut self) {
        self.outcome.get_or_insert(Err(StreamError::MaxRepeatExceeded));
    }
}

impl ActionBehavior for SendingDataBehavior {
    type Output = ();
    type Error = StreamError;

    fn update(&mut self, _now: Instant, _ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        match self.outcome.take() {
            None => UpdateStatus::Continue,
            Some(Ok(())) => UpdateStatus::Result(()),
            Some(Err(error)) => UpdateStatus::Error(error),
        }
    }
}

/// Send-side payload buffer, ordered by offset.
pub struct SendDataBuffer {
    actions: ActionContext,
    entries: Vec<SendingDataPtr>,
}

impl SendDataBuffer {
    pub fn new(actions: ActionContext) -> Self {
        Self { actions, entries: Vec::new() }
    }

    pub fn add(&mut self, offset: SsRingIndex, data: Bytes) -> SendingDataPtr {
        let ptr = self.actions.spawn(SendingDataBehavior::new(offset, data));
        self.entries.push(ptr.clone());
        ptr
    }

    /// Slice up to `max_len` bytes starting at `offset`. Slices never span
    /// payload boundaries, so a datagram always carries bytes of one write.
    pub fn slice(&self, offset: SsRingIndex, max_len: usize) -> Option<DataChunk> {
        for entry in &self.entries {
            let hit = entry.peek(|behavior| {
                let range = behavior.range();
                range.in_range(offset).then(|| {
                    let from = behavior.offset.distance_to(offset) as usize;
                    let len = (behavior.data.len() - from).min(max_len);
                    DataChunk { offset, data: behavior.data.slice(from..from + len) }
                })
            });
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    /// Cumulative ack up to and including `offset`. Fully acknowledged
    /// payloads fire `Result` and leave the buffer.
    pub fn acknowledge(&mut self, offset: SsRingIndex) {
        for entry in &self.entries {
            entry.with(|behavior| behavior.acknowledge(offset));
        }
        self.prune();
    }

    /// Fail every payload overlapping `range` with `MaxRepeatExceeded`.
    pub fn fail_overlapping(&mut self, range: OffsetRange) {
        for entry in &self.entries {
            entry.with(|behavior| {
                let own = behavior.range();
                let disjoint = own.is_before(range.left) || own.is_after(range.right);
                if !disjoint {
                    behavior.fail();
                }
            });
        }
        self.prune();
    }

    pub fn clear(&mut self) {
        for entry in &self.entries {
            entry.stop();
        }
        self.entries.clear();
    }

    pub fn pending_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.peek(|behavior| behavior.data.len() - behavior.acked))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self) {
        self.entries.retain(|entry| {
            !entry.is_finished() && entry.peek(|behavior| behavior.outcome.is_none())
        });
    }
}
