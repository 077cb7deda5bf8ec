//! Messenger configuration.

use std::time::Duration;

use parley_core::DEFAULT_TYPING_WINDOW;

/// Time allowed for the broker to answer `CONNECT` with `CONNECTED`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the outbound frame queue, each subscription stream
/// and the event broadcast.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a [`crate::Messenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Bounded wait for the broker's `CONNECTED` frame.
    pub connect_timeout: Duration,
    /// Quiet window after the last keystroke before "stopped typing".
    pub typing_window: Duration,
    /// STOMP `host` header sent in `CONNECT`.
    pub virtual_host: String,
    /// Frames that may queue for the transport before publishes fail with
    /// backpressure.
    pub outbound_capacity: usize,
    /// Events buffered per subscription stream before items are dropped.
    pub subscription_capacity: usize,
    /// Store events buffered per [`crate::Messenger::events`] receiver.
    pub event_capacity: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            typing_window: DEFAULT_TYPING_WINDOW,
            virtual_host: "/".to_owned(),
            outbound_capacity: DEFAULT_CHANNEL_CAPACITY,
            subscription_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl MessengerConfig {
    /// Short timeouts for local development against a broker on loopback.
    pub fn development() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            typing_window: Duration::from_millis(1_500),
            ..Self::default()
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the typing quiet window.
    #[must_use]
    pub fn with_typing_window(mut self, window: Duration) -> Self {
        self.typing_window = window;
        self
    }
}
