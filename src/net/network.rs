//! The channel/port registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::util::DetRng;

use super::{Channel, NetConfig, PeerId, Port};

struct NetworkInner<T: 'static> {
    links: RefCell<HashMap<(PeerId, PeerId), Channel<T>>>,
    ports: RefCell<HashMap<PeerId, Port<T>>>,
    config: Rc<NetConfig>,
    rng: Rc<RefCell<DetRng>>,
}

/// A collection of channels and ports, created lazily by peer id.
///
/// All links share one [`NetConfig`] and one deterministic randomness
/// source; two networks built from the same config behave identically.
pub struct Network<T: 'static> {
    inner: Rc<NetworkInner<T>>,
}

impl<T> Clone for Network<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> Network<T> {
    /// Creates a network with the given configuration.
    #[must_use]
    pub fn new(config: NetConfig) -> Self {
        let rng = Rc::new(RefCell::new(DetRng::new(config.seed)));
        Self {
            inner: Rc::new(NetworkInner {
                links: RefCell::new(HashMap::new()),
                ports: RefCell::new(HashMap::new()),
                config: Rc::new(config),
                rng,
            }),
        }
    }

    /// Returns the channel for the `src → dst` link, creating it on
    /// first use.
    pub fn link(&self, src: impl Into<PeerId>, dst: impl Into<PeerId>) -> Channel<T> {
        let (src, dst) = (src.into(), dst.into());
        if let Some(channel) = self.inner.links.borrow().get(&(src, dst)) {
            return channel.clone();
        }
        let channel = Channel::new(
            src,
            self.input(dst),
            Rc::clone(&self.inner.config),
            Rc::clone(&self.inner.rng),
        );
        self.inner
            .links
            .borrow_mut()
            .insert((src, dst), channel.clone());
        channel
    }

    /// Returns the port accepting messages for `id`, creating it on
    /// first use.
    pub fn input(&self, id: impl Into<PeerId>) -> Port<T> {
        let id = id.into();
        self.inner
            .ports
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Port::new(id))
            .clone()
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.inner.config
    }

    /// Returns true with probability `p`, deterministically.
    pub fn chance(&self, p: f64) -> bool {
        self.inner.rng.borrow_mut().chance(p)
    }

    /// Picks a duration uniformly from `[min, max]`, deterministically.
    /// Useful for jittered retransmission timers.
    pub fn uniform_delay(&self, min: Duration, max: Duration) -> Duration {
        let nanos = self.inner.rng.borrow_mut().uniform_u64(
            u64::try_from(min.as_nanos()).unwrap_or(u64::MAX),
            u64::try_from(max.as_nanos()).unwrap_or(u64::MAX),
        );
        Duration::from_nanos(nanos)
    }

    /// Closes every port and drops every channel and port handle.
    /// Closing wakes pending receivers; follow with
    /// [`driver::clear`](crate::driver::clear) so the woken computations
    /// unwind and release their memory.
    pub fn clear(&self) {
        for port in self.inner.ports.borrow().values() {
            port.close();
        }
        self.inner.links.borrow_mut().clear();
        self.inner.ports.borrow_mut().clear();
    }
}

impl<T: fmt::Debug + 'static> Default for Network<T> {
    fn default() -> Self {
        Self::new(NetConfig::default())
    }
}

impl<T: 'static> fmt::Debug for Network<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("links", &self.inner.links.borrow().len())
            .field("ports", &self.inner.ports.borrow().len())
            .finish()
    }
}
