use strum::Display;

/// Link state of a stream's downstream chain.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Unlinked,
    Linked,
    LinkError,
}

/// Capacity and link snapshot a stream exposes to its upstream.
///
/// `max_element_size` is the hard cap for one write after every downstream
/// overhead has been subtracted; `rec_element_size` is the size writes
/// should aim for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub rec_element_size: usize,
    pub max_element_size: usize,
    pub is_reliable: bool,
    pub link_state: LinkState,
    pub is_writable: bool,
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self {
            rec_element_size: 0,
            max_element_size: 0,
            is_reliable: false,
            link_state: LinkState::Unlinked,
            is_writable: false,
        }
    }
}

impl StreamInfo {
    /// Shrink element budgets by a fixed per-write overhead.
    pub fn minus_overhead(mut self, overhead: usize) -> Self {
        self.rec_element_size = self.rec_element_size.saturating_sub(overhead);
        self.max_element_size = self.max_element_size.saturating_sub(overhead);
        self
    }
}
