mod driver;
mod udp;

pub use driver::UdpDriver;
pub use udp::{UdpConfig, UdpDatagramStream};
