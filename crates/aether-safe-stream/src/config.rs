use aether_timing::Duration;
use serde::{Deserialize, Serialize};

/// Tunables for one Safe Stream session.
///
/// All times run on the same monotonic clock the scheduler is driven with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafeStreamConfig {
    /// Local cap on in-flight bytes regardless of the negotiated window.
    pub buffer_capacity: u16,
    /// Offered receive window, negotiated down to the peer's on init.
    pub window_size: u16,
    /// Offered max payload per datagram, negotiated down on init.
    pub max_packet_size: u16,
    /// Retransmissions per chunk before the send fails.
    pub max_repeat_count: u8,
    /// Base ack deadline for a sent chunk; grows with the backoff factor.
    pub wait_confirm_timeout: Duration,
    /// How long the receiver batches acks before confirming.
    pub send_confirm_timeout: Duration,
    /// Gap age before the receiver asks for a repeat.
    pub send_repeat_timeout: Duration,
    /// Retransmission backoff growth: timeout × factor × repeat_count.
    pub rto_grow_factor: u32,
}

impl Default for SafeStreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 8192,
            window_size: 4096,
            max_packet_size: 200,
            max_repeat_count: 4,
            wait_confirm_timeout: Duration::from_millis(50),
            send_confirm_timeout: Duration::from_millis(10),
            send_repeat_timeout: Duration::from_millis(30),
            rto_grow_factor: 2,
        }
    }
}

impl SafeStreamConfig {
    /// Ack deadline for a chunk already retransmitted `repeat_count` times.
    pub fn repeat_timeout(&self, repeat_count: u8) -> Duration {
        if repeat_count == 0 {
            self.wait_confirm_timeout
        } else {
            self.wait_confirm_timeout * (u64::from(self.rto_grow_factor) * u64::from(repeat_count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_with_factor() {
        let config = SafeStreamConfig::default();
        let base = config.wait_confirm_timeout;
        assert_eq!(config.repeat_timeout(0), base);
        assert_eq!(config.repeat_timeout(1), base * 2);
        assert_eq!(config.repeat_timeout(3), base * 6);
    }

    #[test]
    fn deserializes_humantime_timeouts() {
        let config: SafeStreamConfig = serde_json::from_str(
            r#"{
                "buffer_capacity": 1024,
                "window_size": 512,
                "max_packet_size": 128,
                "max_repeat_count": 3,
                "wait_confirm_timeout": "40ms",
                "send_confirm_timeout": "5ms",
                "send_repeat_timeout": "20ms",
                "rto_grow_factor": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.wait_confirm_timeout, Duration::from_millis(40));
    }
}
