//! Simloop: a deterministic cooperative-multitasking runtime for
//! simulating distributed systems on a single thread with virtual time.
//!
//! # Overview
//!
//! Everything runs on one thread, driven by one event loop, against a
//! virtual clock that advances only when nothing is runnable. Given the
//! same initial state, a simulation replays tick for tick.
//!
//! The pieces:
//!
//! - [`Signal`] — a one-shot latch with listeners; the only wakeup
//!   primitive. [`any`] and [`all`] compose signals k-of-N.
//! - [`Task`] — a suspendable computation over a future, started eagerly
//!   at [`spawn`], resumed by the driver when a signal it waits on fires
//!   or a task it joined finishes. [`interest`] gates work on external
//!   demand (lazy start).
//! - [`race`] — a computation against cancellation signals, yielding
//!   value-or-none.
//! - [`driver`] — the per-thread event loop: immediate queue, ready
//!   queue, timer heap, virtual clock, and teardown that unwinds every
//!   suspended computation.
//! - [`net`] — a network simulator delivering typed messages between
//!   identified peers over lossy, delayed channels.
//!
//! # Example
//!
//! ```
//! use simloop::{driver, spawn};
//! use std::time::Duration;
//!
//! driver::reset();
//! let sum = spawn(async {
//!     driver::after(Duration::from_secs(3600)).await?;
//!     Ok(3 + 4)
//! });
//! driver::run();
//! assert_eq!(sum.try_result().expect("finished").expect("ok"), 7);
//! ```
//!
//! # Determinism
//!
//! The clock advances one tick per task resumption, so time is a
//! monotonic witness of scheduling order. Listener wakeup, the ready
//! queue and the immediate queue are all FIFO; timers fire in
//! `(deadline, insertion order)` order; randomness (timer-heap culling,
//! lossy links) comes from seeded generators. Nothing reads the wall
//! clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod net;
pub mod signal;
pub mod task;
pub mod time;
pub(crate) mod util;

#[doc(hidden)]
pub mod test_utils;

pub use combinator::race;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use signal::{all, any, Signal};
pub use task::{interest, interest_signal, spawn, Task};
pub use time::Time;
