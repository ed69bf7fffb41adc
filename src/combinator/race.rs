//! Race combinator: a computation against cancellation signals.
//!
//! `race(task, signals)` resolves to `Some(value)` if the computation
//! finishes first and `None` if any signal fires first. The losing
//! computation is not forcibly terminated — it stays suspended and is
//! reclaimed when the race's frame drops its handle, or during driver
//! teardown.
//!
//! An error from the raced computation is re-raised in the race's own
//! result.

use crate::signal::{any, Signal};
use crate::task::{spawn, Task};

/// Runs `task` against `signals`.
///
/// Returns a new computation resolving to `Some(value)` when `task`
/// finishes before any of the signals trigger, `None` otherwise. An
/// already-finished task wins immediately without consulting the
/// signals; with no signals this is equivalent to joining the task and
/// wrapping its value in `Some`.
///
/// The raced task is started (its interest signal triggers), so a
/// demand-gated task begins doing work once raced.
pub fn race<T: 'static>(
    task: Task<T>,
    signals: impl IntoIterator<Item = Signal>,
) -> Task<Option<T>> {
    let signals: Vec<Signal> = signals.into_iter().collect();
    spawn(async move {
        if !task.done() {
            task.start();
            let mut members = Vec::with_capacity(signals.len() + 1);
            members.push(task.completion());
            members.extend(signals);
            any(members).wait().await?;
        }
        if task.done() {
            return Ok(Some(task.join().await?));
        }
        Ok(None)
    })
}
