use std::{cell::RefCell, rc::Rc};

use aether_events::Event;
use bytes::Bytes;

use crate::{StreamInfo, WriteHandle};

/// Bidirectional byte conduit.
///
/// Writes travel down the chain towards the transport; received buffers
/// surface through `out_data_event`. `stream_update_event` fires whenever
/// `stream_info` may have changed.
pub trait ByteStream {
    fn write(&mut self, data: Bytes) -> WriteHandle;
    fn out_data_event(&self) -> Event<Bytes>;
    fn stream_update_event(&self) -> Event<()>;
    fn stream_info(&self) -> StreamInfo;
}

pub type StreamHandle = Rc<RefCell<dyn ByteStream>>;

/// A stream that can be linked over a downstream.
pub trait LinkStream: ByteStream {
    fn link_out(&mut self, downstream: StreamHandle);
    fn unlink(&mut self);
}

/// Chain streams left to right in write direction.
///
/// `tie!(a, b, c)` writes `a → b → c`; inbound data and stream updates
/// bubble back `c → b → a`.
#[macro_export]
macro_rules! tie {
    ($left:expr, $right:expr $(,)?) => {{
        let downstream: $crate::StreamHandle = $right.clone();
        $left.borrow_mut().link_out(downstream);
    }};
    ($left:expr, $right:expr, $($rest:expr),+ $(,)?) => {{
        $crate::tie!($right, $($rest),+);
        $crate::tie!($left, $right);
    }};
}
