//! One-shot signals.
//!
//! A [`Signal`] is a reference-counted, single-threaded latch. It starts
//! pending, accumulates listeners (suspended tasks and composing quorums),
//! and transitions exactly once to the triggered state. Triggering wakes
//! task listeners in FIFO order through the driver's ready queue and
//! notifies composing quorums afterwards, working on local copies because
//! a quorum callback may release the last handle to the signal being
//! triggered.
//!
//! Lifetime discipline: a quorum holds strong handles to its members; a
//! member holds only a weak token back to the quorum, and that token is
//! removed on any terminal transition. This keeps the signal graph
//! acyclic for the reference counter.

pub(crate) mod quorum;

use core::mem;
use std::cell::{Cell, RefCell};
use std::future::IntoFuture;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::driver;
use crate::task::awaiter::Wait;
use crate::task::Resumable;

pub use quorum::{all, any};

/// A registered waiter: either a suspended task's resumption token or a
/// quorum composing this signal. Identity is pointer identity; addition
/// is multiset and removal takes a single occurrence.
pub(crate) enum Listener {
    /// A suspended task to push onto the ready queue on trigger.
    Task(Weak<dyn Resumable>),
    /// A quorum to call back into on trigger.
    Quorum(Weak<SignalInner>),
}

/// Listener storage doubles as the state machine: replacing the list with
/// `Triggered` is the one-way transition.
pub(crate) enum Listeners {
    Pending(SmallVec<[Listener; 3]>),
    Triggered,
}

/// Shared state behind a [`Signal`] handle.
pub(crate) struct SignalInner {
    listeners: RefCell<Listeners>,
    /// Set when this signal (or a member below it) contains an unbound
    /// interest token; resolved at suspension time.
    wants_interest: Cell<bool>,
    /// Present when this signal is a quorum over member signals.
    quorum: RefCell<Option<quorum::QuorumState>>,
}

impl SignalInner {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RefCell::new(Listeners::Pending(SmallVec::new())),
            wants_interest: Cell::new(false),
            quorum: RefCell::new(None),
        }
    }

    pub(crate) fn with_quorum(state: quorum::QuorumState) -> Self {
        let inner = Self::new();
        *inner.quorum.borrow_mut() = Some(state);
        inner
    }

    pub(crate) fn triggered(&self) -> bool {
        matches!(&*self.listeners.borrow(), Listeners::Triggered)
    }

    pub(crate) fn empty(&self) -> bool {
        match &*self.listeners.borrow() {
            Listeners::Pending(list) => list.is_empty(),
            Listeners::Triggered => true,
        }
    }

    pub(crate) fn wants_interest(&self) -> bool {
        self.wants_interest.get()
    }

    pub(crate) fn set_wants_interest(&self, value: bool) {
        self.wants_interest.set(value);
    }

    pub(crate) fn quorum_state(&self) -> &RefCell<Option<quorum::QuorumState>> {
        &self.quorum
    }

    /// Registers a listener. Once a signal has triggered its listener set
    /// is permanently empty and registration is a programmer error.
    pub(crate) fn add_listener(&self, listener: Listener) {
        let mut slot = self.listeners.borrow_mut();
        match &mut *slot {
            Listeners::Pending(list) => list.push(listener),
            Listeners::Triggered => panic!("listener added to a triggered signal"),
        }
    }

    /// Removes one occurrence of a task listener, matched by frame
    /// address. No-op after the signal has triggered.
    pub(crate) fn remove_task_listener(&self, token: &Weak<dyn Resumable>) {
        let target: *const () = token.as_ptr().cast();
        self.remove_first(|listener| {
            matches!(listener, Listener::Task(t) if t.as_ptr().cast::<()>() == target)
        });
    }

    /// Removes one occurrence of a quorum listener, matched by address.
    pub(crate) fn remove_quorum_listener(&self, target: *const Self) {
        self.remove_first(|listener| {
            matches!(listener, Listener::Quorum(q) if q.as_ptr() == target)
        });
    }

    fn remove_first(&self, pred: impl Fn(&Listener) -> bool) {
        let mut slot = self.listeners.borrow_mut();
        if let Listeners::Pending(list) = &mut *slot {
            if let Some(pos) = list.iter().position(pred) {
                list.swap_remove(pos);
            }
        }
    }

    /// Fires the signal. Idempotent.
    ///
    /// Order matters here: the listener list is swapped out and the state
    /// becomes terminal first, then quorum membership below this signal is
    /// dismantled, then task listeners go to the ready queue in FIFO
    /// order, and only then are composing quorums called back — from a
    /// local copy, since a callback may drop every other handle to this
    /// signal.
    pub(crate) fn trigger(&self) {
        let listeners = {
            let mut slot = self.listeners.borrow_mut();
            match mem::replace(&mut *slot, Listeners::Triggered) {
                Listeners::Pending(list) => list,
                Listeners::Triggered => return,
            }
        };

        // Deregister from remaining members so none of them can call back
        // into this quorum after it has reached its terminal state.
        quorum::teardown(self);

        let mut quorums: SmallVec<[Weak<SignalInner>; 2]> = SmallVec::new();
        for listener in listeners {
            match listener {
                Listener::Task(token) => driver::enqueue_ready(token),
                Listener::Quorum(q) => quorums.push(q),
            }
        }

        let child: *const Self = self;
        for q in quorums {
            if let Some(q) = q.upgrade() {
                quorum::trigger_member(&q, child);
            }
        }
    }
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        crate::diagnostics::signal_dropped();
        // A signal abandoned with listeners still registered fires them,
        // so waiters observe the cancellation instead of hanging.
        self.trigger();
    }
}

/// A one-shot latch with cheap-clone handles.
///
/// `Signal` is the runtime's only wakeup primitive: tasks suspend by
/// registering on one, timers fire one, quorums compose several. It
/// carries no value — only the monotone pending→triggered state.
///
/// The `ready` handle (also produced by nullary [`any`]/[`all`]) is
/// permanently triggered and allocation-free.
#[derive(Clone)]
pub struct Signal {
    inner: Option<Rc<SignalInner>>,
}

impl Signal {
    /// Creates a new pending signal.
    #[must_use]
    pub fn new() -> Self {
        crate::diagnostics::signal_created();
        Self {
            inner: Some(Rc::new(SignalInner::new())),
        }
    }

    /// Returns a signal that is already triggered.
    #[must_use]
    pub const fn ready() -> Self {
        Self { inner: None }
    }

    /// Returns an interest token: a signal that stays pending until the
    /// task that eventually awaits it has its own interest signal bound
    /// in — that is, until somebody awaits *that* task or calls
    /// [`start`](crate::task::Task::start) on it.
    ///
    /// Compose it with other signals to gate work on external demand:
    /// `any([port_closed, Signal::interest()])`.
    #[must_use]
    pub fn interest() -> Self {
        quorum::interest_token()
    }

    /// Returns true once the signal has fired. Monotone.
    #[must_use]
    pub fn triggered(&self) -> bool {
        self.inner.as_ref().is_none_or(|inner| inner.triggered())
    }

    /// Returns true if the signal has no listeners (including after it
    /// has triggered). The timer heap culls entries whose signal reports
    /// empty.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.inner.as_ref().is_none_or(|inner| inner.empty())
    }

    /// Fires the signal, waking all listeners. Triggering an
    /// already-triggered signal is a no-op.
    pub fn trigger(&self) {
        if let Some(inner) = &self.inner {
            inner.trigger();
        }
    }

    /// Returns a future that completes when the signal triggers.
    ///
    /// Must be awaited from inside a task. If the driver is tearing down
    /// when the waiter is resumed, the future yields
    /// [`ErrorKind::Cleared`](crate::ErrorKind::Cleared).
    #[must_use]
    pub fn wait(&self) -> Wait {
        Wait::new(self.clone())
    }

    pub(crate) fn from_inner(inner: Rc<SignalInner>) -> Self {
        crate::diagnostics::signal_created();
        Self { inner: Some(inner) }
    }

    pub(crate) fn inner(&self) -> Option<&Rc<SignalInner>> {
        self.inner.as_ref()
    }

    pub(crate) fn inner_ptr(&self) -> Option<*const SignalInner> {
        self.inner.as_ref().map(Rc::as_ptr)
    }

    pub(crate) fn wants_interest(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.wants_interest())
    }

    /// Resolves pending interest tokens below this signal by binding
    /// `interest` as a member of every marked quorum. May trigger the
    /// signal in place.
    pub(crate) fn bind_interest(&self, interest: &Self) {
        if let Some(inner) = &self.inner {
            quorum::apply_interest(inner, interest);
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Signal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("triggered", &self.triggered())
            .field("empty", &self.empty())
            .finish()
    }
}

impl IntoFuture for Signal {
    type Output = crate::Result<()>;
    type IntoFuture = Wait;

    fn into_future(self) -> Self::IntoFuture {
        Wait::new(self)
    }
}
