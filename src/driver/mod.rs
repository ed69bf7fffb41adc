//! The driver: one event loop per thread, and the virtual clock.
//!
//! The driver owns three queues — an immediate FIFO of signals to fire
//! before the next scheduling step, a ready FIFO of resumable tasks, and
//! the timer heap — plus the virtual clock. [`run`] drains them to
//! quiescence:
//!
//! 1. fire every immediate signal, FIFO;
//! 2. resume every ready task, FIFO, advancing the clock one tick per
//!    resumption;
//! 3. cull emptied timers, and if nothing else is runnable jump the
//!    clock to the next deadline;
//! 4. fire every timer whose deadline has arrived;
//! 5. repeat until no step produced work.
//!
//! The one-tick rule makes the clock a monotonic witness of scheduling
//! order, so a run's event log is fully determined by its initial state.
//! An immediate signal always fires strictly before a timer due at the
//! same instant.
//!
//! The driver is a thread-local singleton and is never shared across
//! threads. [`clear`] begins teardown: every pending timer and immediate
//! fires, and the subsequent drain resumes every suspended task, whose
//! awaiters yield [`ErrorKind::Cleared`](crate::ErrorKind::Cleared) so
//! the whole task graph unwinds and releases its memory.

mod timer_heap;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Weak;
use std::time::Duration;

use crate::signal::Signal;
use crate::task::Resumable;
use crate::time::Time;

use timer_heap::TimerHeap;

struct Driver {
    ready: VecDeque<Weak<dyn Resumable>>,
    immediate: VecDeque<Signal>,
    timers: TimerHeap,
    now: Time,
    clearing: bool,
}

impl Driver {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            immediate: VecDeque::new(),
            timers: TimerHeap::new(),
            now: Time::GENESIS,
            clearing: false,
        }
    }
}

thread_local! {
    static DRIVER: RefCell<Driver> = RefCell::new(Driver::new());
}

/// Runs `f` with the driver borrowed. Everything that can re-enter the
/// driver — triggering a signal, resuming a task — must happen outside
/// this borrow.
fn with<R>(f: impl FnOnce(&mut Driver) -> R) -> R {
    DRIVER.with(|driver| f(&mut driver.borrow_mut()))
}

/// The current virtual time.
///
/// Starts at [`Time::GENESIS`]; advances one tick per task resumption
/// and jumps to the next timer deadline when nothing is runnable. Never
/// reads the wall clock.
#[must_use]
pub fn now() -> Time {
    with(|d| d.now)
}

/// Advances the clock by one tick without scheduling anything.
pub fn step_time() {
    with(|d| d.now = d.now.tick());
}

/// Returns true while teardown is in progress.
#[must_use]
pub fn clearing() -> bool {
    with(|d| d.clearing)
}

/// Enqueues `signal` to fire before the next scheduling step.
pub fn trigger_asap(signal: &Signal) {
    with(|d| d.immediate.push_back(signal.clone()));
}

/// Returns a signal that fires before the next scheduling step.
#[must_use]
pub fn asap() -> Signal {
    let signal = Signal::new();
    trigger_asap(&signal);
    signal
}

/// Schedules `signal` to fire when the clock reaches `deadline`.
pub fn trigger_at(deadline: Time, signal: &Signal) {
    with(|d| d.timers.push(deadline, signal.clone()));
}

/// Returns a signal that fires when the clock reaches `deadline`.
///
/// A deadline at or before the current time yields an already-triggered
/// signal, so it is observed before the next resumption.
#[must_use]
pub fn at(deadline: Time) -> Signal {
    if deadline <= now() {
        return Signal::ready();
    }
    let signal = Signal::new();
    trigger_at(deadline, &signal);
    signal
}

/// Schedules `signal` to fire after `delay` of virtual time.
pub fn trigger_after(delay: Duration, signal: &Signal) {
    trigger_at(now() + delay, signal);
}

/// Returns a signal that fires after `delay` of virtual time.
#[must_use]
pub fn after(delay: Duration) -> Signal {
    at(now() + delay)
}

/// Drives everything to quiescence: loops until the immediate queue, the
/// ready queue and the timer heap have no work left.
pub fn run() {
    loop {
        let mut progressed = false;

        while let Some(signal) = with(|d| d.immediate.pop_front()) {
            signal.trigger();
            progressed = true;
        }

        loop {
            let Some(token) = with(|d| d.ready.pop_front()) else {
                break;
            };
            progressed = true;
            // a dead token is a task whose owner dropped it after the
            // trigger queued it; nothing to resume
            let Some(frame) = token.upgrade() else {
                continue;
            };
            frame.resume();
            with(|d| {
                if !d.clearing {
                    d.now = d.now.tick();
                }
            });
        }

        with(|d| d.timers.cull());
        with(|d| {
            if d.immediate.is_empty() && d.ready.is_empty() {
                if let Some(deadline) = d.timers.next_deadline() {
                    if deadline > d.now {
                        tracing::trace!(from = %d.now, to = %deadline, "clock jump");
                        d.now = deadline;
                    }
                }
            }
        });

        loop {
            let due = with(|d| {
                match d.timers.next_deadline() {
                    Some(deadline) if deadline <= d.now => Some(d.timers.pop()),
                    _ => None,
                }
            });
            let Some(signal) = due else { break };
            tracing::trace!(now = %now(), "timer fired");
            signal.trigger();
            progressed = true;
        }

        if !progressed {
            break;
        }
    }
    with(|d| d.clearing = false);
}

/// Begins teardown: triggers every immediate and every pending timer
/// with the clearing flag set. A following [`run`] resumes every
/// suspended task so the whole graph unwinds; [`reset`] does both and
/// installs a fresh driver.
pub fn clear() {
    with(|d| d.clearing = true);
    while let Some(signal) = with(|d| d.immediate.pop_front()) {
        signal.trigger();
    }
    let timers = with(|d| d.timers.drain());
    for signal in timers {
        signal.trigger();
    }
}

/// Tears the current driver down and installs a fresh one: clock back at
/// [`Time::GENESIS`], queues empty. Call between independent scenarios.
pub fn reset() {
    clear();
    run();
    // queues are empty after the drain, so replacing the driver cannot
    // re-enter it through signal destructors
    with(|d| *d = Driver::new());
}

pub(crate) fn enqueue_ready(token: Weak<dyn Resumable>) {
    with(|d| d.ready.push_back(token));
}
