//! Deterministic network simulation over the runtime.
//!
//! Three pieces, looked up by integer peer id and created lazily:
//!
//! - [`Channel`] — a directed link between two peers; `send` is a
//!   computation that returns once the sender may transmit again, and
//!   spawns a detached delivery after the link delay (or drops the
//!   message, on a lossy link);
//! - [`Port`] — a peer's input interface; `receive` is a computation
//!   that suspends on a port-local signal until a message arrives;
//! - [`Network`] — the registry of channels and ports, the shared
//!   [`NetConfig`] and the deterministic randomness source.
//!
//! Everything is driven by the virtual clock; a simulation run with the
//! same seed replays exactly.

mod channel;
mod network;
mod port;

pub use channel::Channel;
pub use network::Network;
pub use port::Port;

use std::time::Duration;

/// Identifier of a simulated peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a peer id from a raw integer.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw peer identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

impl From<u64> for PeerId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Configuration of a simulated network.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Time for a message to traverse a link.
    pub link_delay: Duration,
    /// Time before the sender may transmit again.
    pub send_delay: Duration,
    /// Probability that a link drops a message.
    pub loss: f64,
    /// Seed for the deterministic randomness source.
    pub seed: u64,
}

impl NetConfig {
    /// Creates the default configuration: 20 ms links, 1 ms sender busy
    /// time, no loss.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            link_delay: Duration::from_millis(20),
            send_delay: Duration::from_millis(1),
            loss: 0.0,
            seed,
        }
    }

    /// Sets the link traversal delay.
    #[must_use]
    pub const fn link_delay(mut self, delay: Duration) -> Self {
        self.link_delay = delay;
        self
    }

    /// Sets the sender busy delay.
    #[must_use]
    pub const fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Sets the message loss probability.
    #[must_use]
    pub const fn loss(mut self, probability: f64) -> Self {
        self.loss = probability;
        self
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::new(0x5EED)
    }
}

/// Network-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// The port was closed while a receive was pending.
    #[error("port {port} closed")]
    Closed {
        /// The closed port.
        port: PeerId,
    },
}
