use aether_actions::{ActionContext, ActionProcessor};
use aether_timing::{Duration, Instant};

use crate::loopback::LoopbackLink;

/// Deterministic driver for scheduler + loopback tests.
///
/// Runs the processor and the link pump alternately at an explicit
/// simulated clock, the way an embedder loop would, with no real sleeping.
pub struct Harness {
    pub processor: ActionProcessor,
    pub now: Instant,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self { processor: ActionProcessor::new(), now: Instant::ZERO }
    }

    pub fn actions(&self) -> ActionContext {
        self.processor.context()
    }

    /// Run processor passes and link deliveries until the current instant
    /// has no more work.
    pub fn settle(&mut self, link: &LoopbackLink) {
        loop {
            let wake = self.processor.update(self.now);
            let delivered = link.pump(self.now);
            if !delivered && wake > self.now {
                break;
            }
        }
    }

    /// Advance the clock one step and settle.
    pub fn advance(&mut self, link: &LoopbackLink, step: Duration) {
        self.now += step;
        self.settle(link);
    }

    /// Walk the clock forward for `total` in `step` increments.
    pub fn run_for(&mut self, link: &LoopbackLink, total: Duration, step: Duration) {
        let end = self.now + total;
        self.settle(link);
        while self.now < end {
            self.advance(link, step);
        }
    }

    /// Settle without a link, for processor-only tests.
    pub fn settle_processor(&mut self) {
        loop {
            let wake = self.processor.update(self.now);
            if wake > self.now {
                break;
            }
        }
    }
}
