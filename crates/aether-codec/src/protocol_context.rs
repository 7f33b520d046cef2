use std::{cell::RefCell, collections::HashMap, rc::Rc};

use tracing::debug;

use crate::{ApiError, CodecError, RequestId, Unpacker};

type ResultCallback = Box<dyn FnOnce(&mut Unpacker<'_>) -> Result<(), CodecError>>;
type ErrorCallback = Box<dyn FnOnce(ApiError)>;

#[derive(Default)]
struct ContextInner {
    result_callbacks: HashMap<RequestId, ResultCallback>,
    error_callbacks: HashMap<RequestId, ErrorCallback>,
}

/// Per-connection request/response correlation state.
///
/// Every request-style method call registers a pair of callbacks under its
/// fresh [`RequestId`]; the parser resolves whichever of `SendResult` /
/// `SendError` arrives first and drops the sibling.
#[derive(Clone, Default)]
pub struct ProtocolContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl ProtocolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_result(
        &self,
        request_id: RequestId,
        callback: impl FnOnce(&mut Unpacker<'_>) -> Result<(), CodecError> + 'static,
    ) {
        self.inner.borrow_mut().result_callbacks.insert(request_id, Box::new(callback));
    }

    pub fn on_error(&self, request_id: RequestId, callback: impl FnOnce(ApiError) + 'static) {
        self.inner.borrow_mut().error_callbacks.insert(request_id, Box::new(callback));
    }

    /// Resolve a `SendResult`. Returns false when no caller is waiting; the
    /// parser then cancels the rest of the packet since the payload layout
    /// is unknown without the waiter.
    pub(crate) fn dispatch_result(
        &self,
        request_id: RequestId,
        unpacker: &mut Unpacker<'_>,
    ) -> Result<bool, CodecError> {
        let callback = {
            let mut inner = self.inner.borrow_mut();
            inner.error_callbacks.remove(&request_id);
            inner.result_callbacks.remove(&request_id)
        };
        match callback {
            Some(callback) => {
                callback(unpacker)?;
                Ok(true)
            }
            None => {
                debug!(%request_id, "no waiter for result");
                Ok(false)
            }
        }
    }

    pub(crate) fn dispatch_error(&self, request_id: RequestId, error: ApiError) {
        let callback = {
            let mut inner = self.inner.borrow_mut();
            inner.result_callbacks.remove(&request_id);
            inner.error_callbacks.remove(&request_id)
        };
        match callback {
            Some(callback) => callback(error),
            None => debug!(%request_id, ?error, "no waiter for error"),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.borrow().result_callbacks.len()
    }
}
