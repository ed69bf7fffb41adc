//! Directed links between peers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::driver;
use crate::error::ResultExt;
use crate::task::{spawn, Task};
use crate::util::DetRng;

use super::{NetConfig, PeerId, Port};

pub(crate) struct ChannelInner<T: 'static> {
    src: PeerId,
    dst: Port<T>,
    config: Rc<NetConfig>,
    rng: Rc<RefCell<DetRng>>,
}

/// A directed link from one peer to another.
///
/// Handles are cheap clones. The link is not a queue: each `send`
/// spawns its own detached delivery computation, so messages in flight
/// are independent and a lossy link drops each one independently.
pub struct Channel<T: 'static> {
    inner: Rc<ChannelInner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> Channel<T> {
    pub(crate) fn new(
        src: PeerId,
        dst: Port<T>,
        config: Rc<NetConfig>,
        rng: Rc<RefCell<DetRng>>,
    ) -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                src,
                dst,
                config,
                rng,
            }),
        }
    }

    /// The sending peer.
    #[must_use]
    pub fn source(&self) -> PeerId {
        self.inner.src
    }

    /// The receiving peer.
    #[must_use]
    pub fn destination(&self) -> PeerId {
        self.inner.dst.id()
    }

    /// Sends a message on this link.
    ///
    /// The returned computation finishes once the sender may transmit
    /// again (after the configured send delay). Delivery happens in a
    /// detached computation after the link delay — or not at all, if the
    /// lossy link drops the message.
    pub fn send(&self, msg: T) -> Task<()> {
        let link = Rc::clone(&self.inner);
        spawn(async move {
            tracing::debug!(
                target: "simloop::net",
                time = %driver::now(),
                src = %link.src,
                dst = %link.dst.id(),
                msg = ?msg,
                "send",
            );

            let lost = link.config.loss > 0.0 && link.rng.borrow_mut().chance(link.config.loss);
            if lost {
                tracing::debug!(
                    target: "simloop::net",
                    time = %driver::now(),
                    src = %link.src,
                    dst = %link.dst.id(),
                    "drop",
                );
            } else {
                let port = link.dst.clone();
                let delay = link.config.link_delay;
                spawn(async move {
                    driver::after(delay).await.context("link delivery")?;
                    port.deliver(msg);
                    Ok(())
                })
                .detach();
            }

            // sending occupies the sender for a while
            driver::after(link.config.send_delay).await?;
            Ok(())
        })
    }
}

impl<T: 'static> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("src", &self.inner.src)
            .field("dst", &self.inner.dst.id())
            .finish()
    }
}
