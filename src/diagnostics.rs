//! Live-object counters.
//!
//! The runtime promises that teardown releases everything: after
//! `clear()` plus a drain, no signal body and no task frame remains
//! alive. These thread-local counters let tests (and embedders) check
//! that promise cheaply. Counts are per thread because the driver is.

use std::cell::Cell;

thread_local! {
    static LIVE_SIGNALS: Cell<usize> = const { Cell::new(0) };
    static LIVE_TASKS: Cell<usize> = const { Cell::new(0) };
}

/// Number of signal bodies currently alive on this thread.
#[must_use]
pub fn live_signals() -> usize {
    LIVE_SIGNALS.with(Cell::get)
}

/// Number of task frames currently alive on this thread.
#[must_use]
pub fn live_tasks() -> usize {
    LIVE_TASKS.with(Cell::get)
}

pub(crate) fn signal_created() {
    LIVE_SIGNALS.with(|c| c.set(c.get() + 1));
}

pub(crate) fn signal_dropped() {
    LIVE_SIGNALS.with(|c| c.set(c.get().saturating_sub(1)));
}

pub(crate) fn task_created() {
    LIVE_TASKS.with(|c| c.set(c.get() + 1));
}

pub(crate) fn task_dropped() {
    LIVE_TASKS.with(|c| c.set(c.get().saturating_sub(1)));
}
