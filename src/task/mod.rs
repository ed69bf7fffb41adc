//! Suspendable computations.
//!
//! A [`Task`] reifies a computation: a future producing `Result<T>`,
//! polled to its first suspension point synchronously at [`spawn`] time
//! (eager start) and thereafter resumed only by the driver — when a
//! signal it waits on triggers, or when a task it joined finishes.
//!
//! The frame behind the handle carries the pieces of the protocol: the
//! result slot, an optional completion signal (created on first request),
//! a lazily-created interest signal for demand-gated work, and the
//! continuation of at most one joining task. Terminal order is fixed:
//! store the result, drop the future (running the body's destructors),
//! trigger the completion signal, resume the continuation, then release
//! self-owned storage if the task was detached.
//!
//! Dropping an owned handle cancels a suspended task: the frame goes away
//! with its future, and the in-flight awaiter deregisters its listener on
//! the way out.

pub mod awaiter;

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use crate::error::Result;
use crate::signal::Signal;

pub use awaiter::{interest, interest_signal, Interest, InterestSignal, Join, Wait};

/// Type-erased view of a task frame, used for resumption tokens.
///
/// The driver's ready queue, signal listener lists and continuation slots
/// all hold `Weak<dyn Resumable>`: nothing in the runtime keeps a frame
/// alive except its owning handle (or the frame itself, once detached).
pub(crate) trait Resumable {
    /// Polls the frame once. No-op if the task already finished.
    fn resume(self: Rc<Self>);

    /// The task's interest signal, created on first access; pre-triggered
    /// if `start` ran before the signal existed.
    fn interest_signal(&self) -> Signal;
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<dyn Resumable>>> = const { RefCell::new(None) };
}

/// The frame currently being polled.
///
/// # Panics
///
/// Panics when called outside a task poll — awaiting runtime primitives
/// from plain synchronous code is a programmer error.
pub(crate) fn current() -> Rc<dyn Resumable> {
    CURRENT
        .with(|c| c.borrow().clone())
        .expect("awaited outside of a running task")
}

pub(crate) fn current_token() -> Weak<dyn Resumable> {
    Rc::downgrade(&current())
}

fn swap_current(next: Option<Rc<dyn Resumable>>) -> Option<Rc<dyn Resumable>> {
    CURRENT.with(|c| c.replace(next))
}

enum Slot<T> {
    Pending,
    Done(Result<T>),
    Taken,
}

struct Core<T> {
    result: Slot<T>,
    continuation: Option<Weak<dyn Resumable>>,
    completion: Option<Signal>,
    interest: Option<Signal>,
    /// `start` was called before the interest signal existed; the first
    /// access finds it pre-triggered.
    started: bool,
    owned: bool,
    /// Self-reference of a detached frame, cleared on terminal exit.
    keepalive: Option<Rc<dyn Resumable>>,
}

/// Heap storage of a computation. The future lives in its own cell so
/// that awaiters polled inside it can borrow the bookkeeping core.
pub(crate) struct Frame<T: 'static> {
    future: RefCell<Option<Pin<Box<dyn Future<Output = Result<T>>>>>>,
    core: RefCell<Core<T>>,
}

impl<T: 'static> Frame<T> {
    fn new(future: impl Future<Output = Result<T>> + 'static) -> Rc<Self> {
        crate::diagnostics::task_created();
        Rc::new(Self {
            future: RefCell::new(Some(Box::pin(future))),
            core: RefCell::new(Core {
                result: Slot::Pending,
                continuation: None,
                completion: None,
                interest: None,
                started: false,
                owned: true,
                keepalive: None,
            }),
        })
    }

    pub(crate) fn is_done(&self) -> bool {
        self.future.borrow().is_none()
    }

    /// Removes the result.
    ///
    /// # Panics
    ///
    /// Panics if the task has not finished or the result was already
    /// taken.
    pub(crate) fn take_result(&self) -> Result<T> {
        let mut core = self.core.borrow_mut();
        match core::mem::replace(&mut core.result, Slot::Taken) {
            Slot::Done(result) => result,
            Slot::Pending => panic!("task result taken before completion"),
            Slot::Taken => panic!("task result taken twice"),
        }
    }

    /// Expresses interest: triggers the interest signal if it exists,
    /// otherwise arranges for it to be born triggered.
    pub(crate) fn start(&self) {
        if self.is_done() {
            return;
        }
        let signal = {
            let mut core = self.core.borrow_mut();
            match &core.interest {
                Some(signal) => Some(signal.clone()),
                None => {
                    core.started = true;
                    None
                }
            }
        };
        if let Some(signal) = signal {
            signal.trigger();
        }
    }

    pub(crate) fn set_continuation(&self, token: Weak<dyn Resumable>) {
        self.core.borrow_mut().continuation = Some(token);
    }

    pub(crate) fn clear_continuation(&self) {
        self.core.borrow_mut().continuation = None;
    }

    /// Terminal transition. The future is already gone; what remains is
    /// signalling. Everything is hoisted out of the core first because
    /// triggering the completion signal or resuming the continuation can
    /// re-enter this frame (`done`, `take_result`).
    fn finish(self: &Rc<Self>, result: Result<T>) {
        let (completion, continuation, released) = {
            let mut core = self.core.borrow_mut();
            core.result = Slot::Done(result);
            (
                core.completion.take(),
                core.continuation.take(),
                core.keepalive.take(),
            )
        };
        if let Some(signal) = completion {
            signal.trigger();
        }
        if let Some(token) = continuation {
            if let Some(frame) = token.upgrade() {
                frame.resume();
            }
        }
        // `released` is the keepalive of a detached frame; dropping it
        // here lets the frame die once the current resumption unwinds
        drop(released);
    }
}

impl<T: 'static> Drop for Frame<T> {
    fn drop(&mut self) {
        crate::diagnostics::task_dropped();
    }
}

impl<T: 'static> Resumable for Frame<T> {
    fn resume(self: Rc<Self>) {
        let prev = swap_current(Some(self.clone() as Rc<dyn Resumable>));
        let polled = {
            let mut slot = self.future.borrow_mut();
            let poll = slot.as_mut().map(|future| {
                let mut cx = Context::from_waker(Waker::noop());
                future.as_mut().poll(&mut cx)
            });
            if matches!(poll, Some(Poll::Ready(_))) {
                // run the body's destructors before completion becomes
                // observable
                *slot = None;
            }
            poll
        };
        swap_current(prev);
        if let Some(Poll::Ready(result)) = polled {
            self.finish(result);
        }
    }

    fn interest_signal(&self) -> Signal {
        let mut core = self.core.borrow_mut();
        if core.interest.is_none() {
            let signal = Signal::new();
            if core.started {
                signal.trigger();
            }
            core.interest = Some(signal);
        }
        core.interest.clone().expect("interest signal just created")
    }
}

/// Starts a computation.
///
/// The future is polled once before `spawn` returns: a task that never
/// awaits runs to completion here, and one that does stops at its first
/// suspension point. The returned handle owns the frame; dropping it
/// cancels a still-suspended task, and [`Task::detach`] hands ownership
/// to the frame itself.
pub fn spawn<T, F>(future: F) -> Task<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    let frame = Frame::new(future);
    Rc::clone(&frame).resume();
    Task { frame }
}

/// An owning handle to a computation producing `Result<T>`.
pub struct Task<T: 'static> {
    frame: Rc<Frame<T>>,
}

impl<T: 'static> Task<T> {
    /// Returns true once the computation has finished.
    #[must_use]
    pub fn done(&self) -> bool {
        self.frame.is_done()
    }

    /// Returns a signal that triggers when the computation finishes.
    ///
    /// Created lazily on first request; for an already-finished task this
    /// returns an already-triggered signal.
    #[must_use]
    pub fn completion(&self) -> Signal {
        if self.frame.is_done() {
            return Signal::ready();
        }
        let mut core = self.frame.core.borrow_mut();
        core.completion.get_or_insert_with(Signal::new).clone()
    }

    /// Forces eager progress for a demand-gated task: triggers its
    /// interest signal if it exists, or marks it so that the first
    /// access finds it pre-triggered. Awaiting a task does this
    /// implicitly.
    pub fn start(&self) {
        self.frame.start();
    }

    /// Transfers ownership to the computation itself.
    ///
    /// A finished task is released immediately; a suspended one keeps
    /// running and releases its storage on terminal exit (or during
    /// driver teardown).
    pub fn detach(self) {
        if !self.frame.is_done() {
            let mut core = self.frame.core.borrow_mut();
            core.owned = false;
            core.keepalive = Some(Rc::clone(&self.frame) as Rc<dyn Resumable>);
        }
    }

    /// Returns a future that completes when the computation does,
    /// yielding its result. Implicitly calls [`start`](Self::start).
    ///
    /// Must be awaited from inside a task.
    #[must_use]
    pub fn join(self) -> Join<T> {
        Join::new(self.frame)
    }

    /// Removes the result of a finished task, or returns `None` if it is
    /// still running. The non-awaiting counterpart of [`join`](Self::join)
    /// for code outside the driver loop.
    pub fn try_result(&self) -> Option<Result<T>> {
        if self.frame.is_done() {
            Some(self.frame.take_result())
        } else {
            None
        }
    }
}

impl<T: 'static> core::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task").field("done", &self.done()).finish()
    }
}
