mod harness;
mod loopback;
mod mock_stream;

pub use harness::Harness;
pub use loopback::{FaultAction, LoopbackLink, LoopbackStream, random_delay, unreliable};
pub use mock_stream::MockStream;
