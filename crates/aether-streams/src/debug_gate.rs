use bytes::Bytes;
use tracing::trace;

use crate::Gate;

/// Pass-through gate tracing traffic at one point of a chain.
///
/// Useful while wiring a new pipeline; adds no overhead and never alters
/// the data.
pub struct DebugGate {
    label: &'static str,
}

impl DebugGate {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl Gate for DebugGate {
    fn write_in(&mut self, data: Bytes) -> Result<Bytes, crate::StreamError> {
        trace!(label = self.label, len = data.len(), "write in");
        Ok(data)
    }

    fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
        trace!(label = self.label, len = data.len(), "write out");
        Some(data)
    }
}
