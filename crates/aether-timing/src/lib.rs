mod clock;
mod duration;
mod instant;

pub use clock::{Clock, ManualClock};
pub use duration::Duration;
pub use instant::Instant;
