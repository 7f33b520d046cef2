mod byte_stream;
mod debug_gate;
mod error;
mod gate;
mod gate_stream;
mod protocol_read;
mod splitter;
mod stream_info;
mod write_action;

pub use byte_stream::{ByteStream, LinkStream, StreamHandle};
pub use debug_gate::DebugGate;
pub use error::StreamError;
pub use gate::Gate;
pub use gate_stream::GateStream;
pub use protocol_read::ProtocolReadGate;
pub use splitter::{
    STREAM_MESSAGE, SplitStream, StreamId, StreamSplitter, next_client_stream_id,
    next_server_stream_id,
};
pub use stream_info::{LinkState, StreamInfo};
pub use write_action::{WriteBehavior, WriteHandle};
