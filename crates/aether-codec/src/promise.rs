use aether_actions::{ActionBehavior, ActionPtr, UpdateCtl, UpdateStatus};
use aether_timing::Instant;

use crate::{ApiError, RequestId};

/// Pending request/response slot.
///
/// Parked until the protocol context resolves or rejects it; the terminal
/// then surfaces through the action's `Result`/`Error` events.
pub struct PromiseBehavior<R: Clone + 'static> {
    request_id: RequestId,
    outcome: Option<Result<R, ApiError>>,
}

pub type PromisePtr<R> = ActionPtr<PromiseBehavior<R>>;

impl<R: Clone + 'static> PromiseBehavior<R> {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id, outcome: None }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn resolve(&mut self, value: R) {
        self.outcome.get_or_insert(Ok(value));
    }

    pub fn reject(&mut self, error: ApiError) {
        self.outcome.get_or_insert(Err(error));
    }
}

impl<R: Clone + 'static> ActionBehavior for PromiseBehavior<R> {
    type Output = R;
    type Error = ApiError;

    fn update(&mut self, _now: Instant, _ctl: &mut UpdateCtl) -> UpdateStatus<R, ApiError> {
        match self.outcome.take() {
            None => UpdateStatus::Continue,
            Some(Ok(value)) => UpdateStatus::Result(value),
            Some(Err(error)) => UpdateStatus::Error(error),
        }
    }
}
