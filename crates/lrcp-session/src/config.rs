use std::time::Duration;

use lrcp_frame::FrameConfig;
use lrcp_transport::DEFAULT_IDLE_TIMEOUT;

/// Session engine behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between retransmissions of unacknowledged data.
    pub retransmit_interval: Duration,
    /// Sessions whose peer stays silent this long are closed.
    pub idle_timeout: Duration,
    /// Upper bound on how long a receive loop blocks before checking idle
    /// peers and its shutdown flag.
    pub sweep_interval: Duration,
    /// How long a client waits for its `connect` to be acknowledged.
    pub connect_timeout: Duration,
    /// Codec limits.
    pub frame: FrameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: Duration::from_secs(3),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(5),
            frame: FrameConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Override the retransmit interval.
    pub fn with_retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval = interval;
        self
    }

    /// Override the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the receive-loop sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Override the client connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Receive-loop read timeout: the sweep interval, but never longer than
    /// the idle timeout.
    pub(crate) fn poll_interval(&self) -> Duration {
        self.sweep_interval.min(self.idle_timeout).max(Duration::from_millis(1))
    }
}
