use aether_timing::Instant;

use crate::{ring_index::SsRingIndex, types::OffsetRange};

/// Bookkeeping for one transmitted slice.
#[derive(Debug, Clone, Copy)]
pub struct SendingChunk {
    pub range: OffsetRange,
    pub repeat_count: u8,
    pub send_time: Instant,
    /// Peer asked for this chunk; retransmit regardless of its deadline.
    pub forced: bool,
}

/// Transmitted-but-unacked slices in send order.
///
/// Chunks are registered when a slice first hits the wire and die when a
/// cumulative ack covers them or their retransmission budget runs out.
#[derive(Debug, Default)]
pub struct SendingChunkList {
    chunks: Vec<SendingChunk>,
}

impl SendingChunkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh transmission. Re-registering the exact range
    /// refreshes its send time and moves it to the back.
    pub fn register(&mut self, range: OffsetRange, send_time: Instant) {
        if let Some(pos) = self.chunks.iter().position(|chunk| chunk.range == range) {
            let mut chunk = self.chunks.remove(pos);
            chunk.send_time = send_time;
            self.chunks.push(chunk);
            return;
        }
        self.chunks.push(SendingChunk { range, repeat_count: 0, send_time, forced: false });
    }

    /// Drop every chunk fully covered by a cumulative ack at `offset`; trim
    /// a chunk the ack cuts into.
    pub fn remove_up_to(&mut self, offset: SsRingIndex) {
        self.chunks.retain_mut(|chunk| {
            if chunk.range.is_before(offset) || chunk.range.right == offset {
                return false;
            }
            if chunk.range.in_range(offset) {
                chunk.range.left = offset.next();
            }
            true
        });
    }

    /// Force the chunk containing `offset` to retransmit on the next pass.
    /// Returns whether a chunk was found.
    pub fn expire_at(&mut self, offset: SsRingIndex) -> bool {
        // oldest first, matching the order repeats should go out in
        for chunk in &mut self.chunks {
            if chunk.range.in_range(offset) {
                chunk.forced = true;
                return true;
            }
        }
        false
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SendingChunk> {
        self.chunks.iter_mut()
    }

    pub fn retain(&mut self, keep: impl FnMut(&SendingChunk) -> bool) {
        self.chunks.retain(keep);
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
