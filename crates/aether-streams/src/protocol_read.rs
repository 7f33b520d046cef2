use std::{cell::RefCell, rc::Rc};

use aether_codec::{ApiHandler, ApiParser, ProtocolContext};
use aether_events::Subscription;
use bytes::Bytes;
use tracing::warn;

use crate::ByteStream;

/// Parses every buffer a stream emits against an API class.
///
/// A parse error terminates only the offending packet; the subscription and
/// the stream stay live.
pub struct ProtocolReadGate;

impl ProtocolReadGate {
    #[must_use = "parsing stops when the Subscription is dropped"]
    pub fn subscribe<H: ApiHandler + 'static>(
        stream: &dyn ByteStream,
        protocol: ProtocolContext,
        handler: Rc<RefCell<H>>,
    ) -> Subscription {
        stream.out_data_event().subscribe(move |data: &Bytes| {
            let mut parser = ApiParser::new(protocol.clone(), data);
            if let Err(err) = parser.parse(&mut *handler.borrow_mut()) {
                warn!(?err, len = data.len(), "dropping unparseable packet");
            }
        })
    }
}
