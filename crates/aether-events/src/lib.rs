mod cumulative;
mod event;
mod subscription;

pub use cumulative::CumulativeEvent;
pub use event::Event;
pub use subscription::{Subscription, SubscriptionSet};
