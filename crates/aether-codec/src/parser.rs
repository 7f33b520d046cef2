use tracing::debug;

use crate::{
    ApiError, CodecError, MessageId, ProtocolContext, RequestId, Unpacker,
    return_result::{SEND_ERROR, SEND_RESULT},
};

/// Whether an API class recognised a message id.
///
/// `No` lets a parent API forward the id to an extension before declaring it
/// unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
}

/// One API class on the parse side: a typed dispatch table from message id
/// to handler method.
pub trait ApiHandler {
    fn handle(&mut self, id: MessageId, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError>;
}

/// Walks a packet, dispatching each message to the given API class.
///
/// The built-in return-result messages (`SendResult`, `SendError`) are
/// resolved against the [`ProtocolContext`] before the API class sees the
/// id. An id nobody recognises aborts the packet with
/// [`CodecError::UnknownMessage`]; the connection stays usable.
pub struct ApiParser<'a> {
    unpacker: Unpacker<'a>,
    protocol: ProtocolContext,
}

impl<'a> ApiParser<'a> {
    pub fn new(protocol: ProtocolContext, data: &'a [u8]) -> Self {
        Self { unpacker: Unpacker::new(data), protocol }
    }

    pub fn parse(&mut self, api: &mut dyn ApiHandler) -> Result<(), CodecError> {
        while !self.unpacker.is_empty() {
            let id = self.unpacker.read_message_id()?;
            match id {
                SEND_RESULT => self.parse_send_result()?,
                SEND_ERROR => self.parse_send_error()?,
                _ => {
                    if api.handle(id, self)? == Handled::No {
                        return Err(CodecError::UnknownMessage(id));
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_send_result(&mut self) -> Result<(), CodecError> {
        let request_id = RequestId(self.unpacker.read_u16()?);
        let handled = self.protocol.dispatch_result(request_id, &mut self.unpacker)?;
        if !handled {
            // without the waiter the result payload cannot be sized
            debug!(%request_id, "cancelling packet after orphan result");
            self.unpacker.cancel();
        }
        Ok(())
    }

    fn parse_send_error(&mut self) -> Result<(), CodecError> {
        let request_id = RequestId(self.unpacker.read_u16()?);
        let error_type = self.unpacker.read_u8()?;
        let error_code = self.unpacker.read_u32()?;
        self.protocol.dispatch_error(request_id, ApiError { error_type, error_code });
        Ok(())
    }

    pub fn unpacker(&mut self) -> &mut Unpacker<'a> {
        &mut self.unpacker
    }

    pub fn protocol(&self) -> &ProtocolContext {
        &self.protocol
    }

    /// Skip the remainder of the packet.
    pub fn cancel(&mut self) {
        self.unpacker.cancel();
    }
}
