use aether_actions::{ActionContext, ActionPtr};

use crate::{
    MessageId, Packable, Packer, ProtocolContext, RequestId,
    promise::{PromiseBehavior, PromisePtr},
};

pub const SEND_RESULT: MessageId = 0;
pub const SEND_ERROR: MessageId = 1;

/// Encoders for the built-in response messages and the request/promise
/// wiring every request-style method call goes through.
pub struct ReturnResultApi;

impl ReturnResultApi {
    /// `SendResult(request_id, payload)`
    pub fn send_result<T: Packable>(packer: &mut Packer, request_id: RequestId, value: &T) {
        packer.write_message_id(SEND_RESULT);
        request_id.pack(packer);
        value.pack(packer);
    }

    /// `SendError(request_id, error_type, error_code)`
    pub fn send_error(packer: &mut Packer, request_id: RequestId, error_type: u8, error_code: u32) {
        packer.write_message_id(SEND_ERROR);
        request_id.pack(packer);
        packer.write_u8(error_type);
        packer.write_u32(error_code);
    }

    /// Allocate a request id, register response resolution against
    /// `protocol` and return the pending promise.
    pub fn request<R: Packable + Clone + 'static>(
        actions: &ActionContext,
        protocol: &ProtocolContext,
        request_id: RequestId,
    ) -> PromisePtr<R> {
        let promise: ActionPtr<PromiseBehavior<R>> =
            actions.spawn(PromiseBehavior::new(request_id));

        let resolve = promise.clone();
        protocol.on_result(request_id, move |unpacker| {
            let value = R::unpack(unpacker)?;
            resolve.with(|p| p.resolve(value));
            Ok(())
        });

        let reject = promise.clone();
        protocol.on_error(request_id, move |error| {
            reject.with(|p| p.reject(error));
        });

        promise
    }
}
