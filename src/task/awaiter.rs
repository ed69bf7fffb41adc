//! Awaiters: the suspension protocol.
//!
//! Four futures connect task bodies to the runtime:
//!
//! - [`Wait`] suspends on a signal (obtained via [`Signal::wait`] or by
//!   awaiting the signal directly);
//! - [`Join`] suspends on another task, registering as its continuation;
//! - [`Interest`] suspends on the enclosing task's own interest signal;
//! - [`InterestSignal`] returns that signal without suspending.
//!
//! Every suspending awaiter carries a cancellation hook: dropped before
//! resumption, it removes whatever it registered. A signal waiter resumed
//! while the driver is tearing down yields
//! [`ErrorKind::Cleared`](crate::ErrorKind::Cleared), which `?` in task
//! bodies propagates outward until the whole awaiter chain has unwound.

use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use crate::driver;
use crate::error::{Error, Result};
use crate::signal::{Listener, Signal};

use super::{Frame, Resumable};

/// Future returned by [`Signal::wait`]. Completes when the signal
/// triggers.
pub struct Wait {
    signal: Signal,
    registered: Option<Weak<dyn Resumable>>,
}

impl Wait {
    pub(crate) fn new(signal: Signal) -> Self {
        Self {
            signal,
            registered: None,
        }
    }
}

impl Future for Wait {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.registered.take().is_some() {
            // resumed by a trigger; during teardown the resumption exists
            // only to let this frame unwind
            if driver::clearing() {
                return Poll::Ready(Err(Error::cleared()));
            }
            return Poll::Ready(Ok(()));
        }

        if this.signal.triggered() {
            return Poll::Ready(Ok(()));
        }

        // Resolve pending interest tokens before registering; binding may
        // trigger the signal and make suspension unnecessary.
        if this.signal.wants_interest() {
            let interest = super::current().interest_signal();
            this.signal.bind_interest(&interest);
            if this.signal.triggered() {
                return Poll::Ready(Ok(()));
            }
        }

        let token = super::current_token();
        this.signal
            .inner()
            .expect("untriggered signal has a body")
            .add_listener(Listener::Task(token.clone()));
        this.registered = Some(token);
        Poll::Pending
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        // cancellation: deregister before the frame goes away
        if let Some(token) = &self.registered {
            if let Some(inner) = self.signal.inner() {
                inner.remove_task_listener(token);
            }
        }
    }
}

/// Future returned by [`Task::join`](crate::task::Task::join). Completes
/// with the awaited task's result.
pub struct Join<T: 'static> {
    frame: Rc<Frame<T>>,
    suspended: bool,
}

impl<T: 'static> Join<T> {
    pub(crate) fn new(frame: Rc<Frame<T>>) -> Self {
        Self {
            frame,
            suspended: false,
        }
    }
}

impl<T: 'static> Future for Join<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.suspended {
            // resumed as the continuation, so the task has finished; a
            // teardown unwind arrives through its result slot
            this.suspended = false;
            return Poll::Ready(this.frame.take_result());
        }

        if this.frame.is_done() {
            return Poll::Ready(this.frame.take_result());
        }

        this.frame.start();
        this.frame.set_continuation(super::current_token());
        this.suspended = true;
        Poll::Pending
    }
}

impl<T: 'static> Drop for Join<T> {
    fn drop(&mut self) {
        if self.suspended && !self.frame.is_done() {
            self.frame.clear_continuation();
        }
    }
}

/// Suspends the enclosing task until somebody wants its result: another
/// task awaits it, [`Task::start`](crate::task::Task::start) is called,
/// or a bound interest token fires.
///
/// A task whose body begins with `interest().await?` does no work until
/// demanded (lazy start).
#[must_use]
pub fn interest() -> Interest {
    Interest { wait: None }
}

/// Future returned by [`interest`].
pub struct Interest {
    wait: Option<Wait>,
}

impl Future for Interest {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let wait = this
            .wait
            .get_or_insert_with(|| super::current().interest_signal().wait());
        Pin::new(wait).poll(cx)
    }
}

/// Returns the enclosing task's interest signal without suspending.
///
/// Useful for handing the signal to other machinery — for example as a
/// member of a quorum built elsewhere.
#[must_use]
pub fn interest_signal() -> InterestSignal {
    InterestSignal(())
}

/// Future returned by [`interest_signal`]. Always ready.
pub struct InterestSignal(());

impl Future for InterestSignal {
    type Output = Signal;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(super::current().interest_signal())
    }
}
