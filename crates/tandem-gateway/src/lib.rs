pub mod auth;
pub mod connection;
pub mod dispatcher;

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Frames buffered per connection before fan-out gives up on it
    pub outbound_queue: usize,
    /// Ping interval; two missed pongs close the connection
    pub heartbeat_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}
