use aether_actions::{ActionBehavior, ActionContext, ActionPtr, UpdateCtl, UpdateStatus};
use aether_timing::Instant;

use crate::StreamError;

/// Tracks one write request through the pipeline.
///
/// The action parks until a lower layer marks it complete (the write reached
/// the next durable point), failed, or stopped. Exactly one terminal event
/// fires.
pub struct WriteBehavior {
    outcome: Option<Outcome>,
}

enum Outcome {
    Done,
    Failed(StreamError),
    Stopped,
}

pub type WriteHandle = ActionPtr<WriteBehavior>;

impl WriteBehavior {
    /// Pending write, resolved later via [`WriteBehavior::complete`].
    pub fn pending(actions: &ActionContext) -> WriteHandle {
        actions.spawn(Self { outcome: None })
    }

    /// Write that already reached its durable point (e.g. handed to the
    /// kernel in the same call).
    pub fn done(actions: &ActionContext) -> WriteHandle {
        actions.spawn(Self { outcome: Some(Outcome::Done) })
    }

    /// Write rejected up front.
    pub fn failed(actions: &ActionContext, error: StreamError) -> WriteHandle {
        actions.spawn(Self { outcome: Some(Outcome::Failed(error)) })
    }

    pub fn complete(&mut self) {
        self.outcome.get_or_insert(Outcome::Done);
    }

    pub fn fail(&mut self, error: StreamError) {
        self.outcome.get_or_insert(Outcome::Failed(error));
    }

    pub fn stopped(&mut self) {
        self.outcome.get_or_insert(Outcome::Stopped);
    }
}

impl ActionBehavior for WriteBehavior {
    type Output = ();
    type Error = StreamError;

    fn update(&mut self, _now: Instant, _ctl: &mut UpdateCtl) -> UpdateStatus<(), StreamError> {
        match self.outcome.take() {
            None => UpdateStatus::Continue,
            Some(Outcome::Done) => UpdateStatus::Result(()),
            Some(Outcome::Failed(error)) => UpdateStatus::Error(error),
            Some(Outcome::Stopped) => UpdateStatus::Stop,
        }
    }
}
