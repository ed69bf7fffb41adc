//! Receiving ports.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::driver;
use crate::error::{Error, ErrorKind, ResultExt};
use crate::signal::Signal;
use crate::task::{spawn, Task};

use super::{NetError, PeerId};

pub(crate) struct PortInner<T> {
    id: PeerId,
    queue: RefCell<VecDeque<T>>,
    /// One-shot wakeup for the pending receive; replaced on every wait.
    wakeup: RefCell<Signal>,
    closed: Cell<bool>,
}

impl<T> Drop for PortInner<T> {
    fn drop(&mut self) {
        // wake a pending receive so driver cleanup can reclaim it
        self.wakeup.borrow().trigger();
    }
}

/// A peer's input interface.
///
/// Handles are cheap clones sharing the message queue. A `receive`
/// suspended on a closed or destroyed port wakes and observes
/// [`ErrorKind::ChannelClosed`] (closed) or unwinds at teardown
/// (destroyed).
pub struct Port<T: 'static> {
    inner: Rc<PortInner<T>>,
}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Port<T> {
    pub(crate) fn new(id: PeerId) -> Self {
        Self {
            inner: Rc::new(PortInner {
                id,
                queue: RefCell::new(VecDeque::new()),
                wakeup: RefCell::new(Signal::new()),
                closed: Cell::new(false),
            }),
        }
    }

    /// The peer this port belongs to.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.inner.id
    }
}

impl<T: fmt::Debug + 'static> Port<T> {
    /// Receives the next message, suspending until one is available.
    pub fn receive(&self) -> Task<T> {
        let port = Rc::clone(&self.inner);
        spawn(async move {
            loop {
                if port.closed.get() {
                    return Err(Error::new(ErrorKind::ChannelClosed)
                        .with_source(NetError::Closed { port: port.id }));
                }
                if let Some(msg) = port.queue.borrow_mut().pop_front() {
                    tracing::debug!(
                        target: "simloop::net",
                        time = %driver::now(),
                        port = %port.id,
                        msg = ?msg,
                        "recv",
                    );
                    return Ok(msg);
                }
                // signals are one-shot, so each wait installs a fresh one
                let signal = Signal::new();
                *port.wakeup.borrow_mut() = signal.clone();
                signal
                    .await
                    .with_context(|| format!("receive on {}", port.id))?;
            }
        })
    }

    /// Closes the port: a pending receive (and any later one) observes
    /// [`ErrorKind::ChannelClosed`].
    pub fn close(&self) {
        self.inner.closed.set(true);
        let signal = self.inner.wakeup.borrow().clone();
        signal.trigger();
    }

    /// Number of queued, undelivered messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub(crate) fn deliver(&self, msg: T) {
        tracing::debug!(
            target: "simloop::net",
            time = %driver::now(),
            port = %self.inner.id,
            msg = ?msg,
            "deliver",
        );
        self.inner.queue.borrow_mut().push_back(msg);
        let signal = self.inner.wakeup.borrow().clone();
        signal.trigger();
    }
}

impl<T: 'static> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.inner.id)
            .field("pending", &self.inner.queue.borrow().len())
            .finish()
    }
}
