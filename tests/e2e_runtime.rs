//! End-to-end runtime scenarios.
//!
//! Each test drives the full stack — signals, tasks, combinators, timer
//! heap, virtual clock — through the public API and asserts observable
//! order and timing. The driver is thread-local, so every test starts
//! clean; scenarios inside one test are separated by `driver::reset`.

use std::time::Duration;

use simloop::test_utils::{init_test_logging, Recorder};
use simloop::{all, any, diagnostics, driver, interest, interest_signal, race, spawn, Signal, Time};

const HOUR: Duration = Duration::from_secs(3600);

fn elapsed() -> Duration {
    Duration::from_nanos(driver::now().duration_since(Time::GENESIS))
}

/// Computation A sleeps an hour and returns 3 + 4; computation B awaits
/// A. Virtual time advances by exactly one hour (give or take the
/// per-resumption ticks) and B observes 7.
#[test]
fn slow_add() {
    init_test_logging();
    simloop::test_phase!("slow_add");
    driver::reset();
    let rec = Recorder::new();

    let a = spawn(async {
        driver::after(HOUR).await?;
        Ok(3 + 4)
    });
    let log = rec.clone();
    let b = spawn(async move {
        let value = a.join().await?;
        log.push(format!("value={value}"));
        Ok(())
    });

    driver::run();

    assert!(b.done());
    simloop::assert_with_log!(
        rec.entries() == ["value=7"],
        "awaiting computation observed the sum",
        ["value=7"],
        rec.entries()
    );
    assert!(elapsed() >= HOUR);
    assert!(elapsed() < HOUR + Duration::from_micros(1));
    driver::reset();
    simloop::test_complete!("slow_add");
}

/// A ten-hour computation raced against a one-hour timeout: the result
/// is `None` and only one hour of virtual time passes.
#[test]
fn race_timeout() {
    init_test_logging();
    driver::reset();

    let slow = spawn(async {
        driver::after(10 * HOUR).await?;
        Ok(1)
    });
    let raced = race(slow, [driver::after(HOUR)]);

    driver::run();

    assert_eq!(
        raced.try_result().expect("race finished").expect("race ok"),
        None
    );
    assert!(elapsed() >= HOUR);
    assert!(elapsed() < 2 * HOUR);
    driver::reset();
}

/// `any` resumes at the first deadline, and the loser's timer is culled
/// instead of stretching the run to ten minutes.
#[test]
fn any_resumes_at_first_deadline() {
    init_test_logging();
    driver::reset();

    let s = any([
        driver::after(Duration::from_secs(300)),
        driver::after(Duration::from_secs(600)),
    ]);
    let waiter = spawn(async move {
        s.await?;
        Ok(driver::now())
    });

    driver::run();

    let resumed_at = waiter
        .try_result()
        .expect("waiter finished")
        .expect("waiter ok");
    assert_eq!(resumed_at.duration_since(Time::GENESIS) / 1_000_000_000, 300);
    // the ten-minute timer was abandoned and culled; the clock never
    // reached it
    assert!(elapsed() < Duration::from_secs(600));
    driver::reset();
}

/// `all` resumes at the last deadline.
#[test]
fn all_resumes_at_last_deadline() {
    init_test_logging();
    driver::reset();

    let s = all([
        driver::after(Duration::from_secs(300)),
        driver::after(Duration::from_secs(600)),
    ]);
    let waiter = spawn(async move {
        s.await?;
        Ok(driver::now())
    });

    driver::run();

    let resumed_at = waiter
        .try_result()
        .expect("waiter finished")
        .expect("waiter ok");
    assert_eq!(resumed_at.duration_since(Time::GENESIS) / 1_000_000_000, 600);
    driver::reset();
}

fn printer(name: &'static str, rec: Recorder) -> simloop::Task<()> {
    spawn(async move {
        rec.push(format!("{name}-began"));
        driver::asap().await?;
        rec.push(format!("{name}-completed"));
        Ok(())
    })
}

/// Two identical printers: bodies run eagerly at spawn, resumptions
/// interleave in FIFO order. Detaching changes ownership, not order.
#[test]
fn detached_printers_interleave_fifo() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    printer("A", rec.clone()).detach();
    let b = printer("B", rec.clone());

    driver::run();

    assert_eq!(
        rec.entries(),
        ["A-began", "B-began", "A-completed", "B-completed"]
    );
    assert!(b.done());
    driver::reset();
}

/// Dropping an owned handle cancels the suspended computation: its body
/// already ran to the first suspension point, but never completes.
#[test]
fn dropped_printer_never_completes() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    let a = printer("A", rec.clone());
    let b = printer("B", rec.clone());
    drop(a);

    driver::run();

    assert_eq!(rec.entries(), ["A-began", "B-began", "B-completed"]);
    drop(b);
    driver::reset();
}

/// A computation gated on `interest` does nothing until demanded: no
/// output, no clock movement. Awaiting it from another computation
/// starts it.
#[test]
fn lazy_start_waits_for_demand() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    let log = rec.clone();
    let gated = spawn(async move {
        interest().await?;
        driver::after(HOUR).await?;
        log.push("ran");
        Ok(42)
    });

    driver::run();
    assert!(rec.entries().is_empty());
    assert_eq!(elapsed(), Duration::ZERO);
    assert!(!gated.done());

    let waiter = spawn(async move { gated.join().await });
    driver::run();

    assert_eq!(
        waiter.try_result().expect("finished").expect("ok"),
        42
    );
    assert_eq!(rec.entries(), ["ran"]);
    assert!(elapsed() >= HOUR);
    driver::reset();
}

/// `Task::start` forces a demand-gated computation without awaiting it.
#[test]
fn start_forces_eager_progress() {
    init_test_logging();
    driver::reset();

    let gated = spawn(async move {
        interest().await?;
        Ok(5)
    });
    driver::run();
    assert!(!gated.done());

    gated.start();
    driver::run();
    assert_eq!(gated.try_result().expect("finished").expect("ok"), 5);
    driver::reset();
}

/// An interest token composed into `any` wakes the gated computation as
/// soon as demand arrives, without waiting for the other members.
#[test]
fn interest_token_in_quorum_wakes_on_demand() {
    init_test_logging();
    driver::reset();

    let gated = spawn(async move {
        any([Signal::interest(), driver::after(1000 * HOUR)]).await?;
        Ok(driver::now())
    });

    driver::run();
    assert!(!gated.done());

    let waiter = spawn(async move { gated.join().await });
    driver::run();

    let woke_at = waiter
        .try_result()
        .expect("waiter finished")
        .expect("waiter ok");
    // demand won the quorum; the distant timer never fired
    assert!(woke_at.duration_since(Time::GENESIS) < 1_000_000_000);
    assert!(elapsed() < Duration::from_secs(1));
    driver::reset();
}

/// `interest_signal` hands out the enclosing task's interest signal
/// without suspending.
#[test]
fn interest_signal_does_not_suspend() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    let log = rec.clone();
    let task = spawn(async move {
        let own: Signal = interest_signal().await;
        log.push("still-running");
        own.await?;
        log.push("demanded");
        Ok(())
    });

    // the non-suspending marker let the body continue synchronously
    assert_eq!(rec.entries(), ["still-running"]);

    task.start();
    driver::run();
    assert_eq!(rec.entries(), ["still-running", "demanded"]);
    driver::reset();
}

/// Timers with equal deadlines fire in insertion order; their waiters
/// resume FIFO.
#[test]
fn equal_deadlines_fire_in_insertion_order() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    let first = driver::after(Duration::from_secs(1));
    let second = driver::after(Duration::from_secs(1));

    let log = rec.clone();
    let a = spawn(async move {
        first.await?;
        log.push("first");
        Ok(())
    });
    let log = rec.clone();
    let b = spawn(async move {
        second.await?;
        log.push("second");
        Ok(())
    });

    driver::run();
    assert_eq!(rec.entries(), ["first", "second"]);
    drop((a, b));
    driver::reset();
}

/// Listener wakeup on a single signal is FIFO in registration order.
#[test]
fn listeners_wake_in_registration_order() {
    init_test_logging();
    driver::reset();
    let rec = Recorder::new();

    let gate = Signal::new();
    let mut tasks = Vec::new();
    for i in 0..4 {
        let log = rec.clone();
        let signal = gate.clone();
        tasks.push(spawn(async move {
            signal.await?;
            log.push(format!("w{i}"));
            Ok(())
        }));
    }

    gate.trigger();
    driver::run();
    assert_eq!(rec.entries(), ["w0", "w1", "w2", "w3"]);
    drop(tasks);
    driver::reset();
}

/// Teardown unwinds every suspended computation and releases all
/// memory: live counters return to zero.
#[test]
fn clear_unwinds_everything() {
    init_test_logging();
    simloop::test_phase!("clear_unwinds_everything");
    driver::reset();

    let far = spawn(async {
        driver::after(1000 * HOUR).await?;
        Ok(1)
    });
    let chain = spawn(async move { far.join().await });
    spawn(async {
        driver::after(999 * HOUR).await?;
        Ok(())
    })
    .detach();

    simloop::test_section!("teardown");
    driver::clear();
    driver::run();

    let err = chain
        .try_result()
        .expect("chain unwound")
        .expect_err("teardown error propagated through the join");
    assert_eq!(err.kind(), simloop::ErrorKind::Cleared);

    drop(chain);
    simloop::assert_with_log!(
        diagnostics::live_tasks() == 0,
        "no task frame survives teardown",
        0usize,
        diagnostics::live_tasks()
    );
    simloop::assert_with_log!(
        diagnostics::live_signals() == 0,
        "no signal body survives teardown",
        0usize,
        diagnostics::live_signals()
    );
    driver::reset();
    simloop::test_complete!("clear_unwinds_everything");
}

/// `reset(); run()` on an empty driver completes without side effects.
#[test]
fn reset_then_run_is_a_no_op() {
    init_test_logging();
    driver::reset();
    driver::run();
    assert_eq!(elapsed(), Duration::ZERO);
    assert_eq!(diagnostics::live_tasks(), 0);
    assert_eq!(diagnostics::live_signals(), 0);
}

/// Racing an already-finished computation returns its value without
/// consulting any signal.
#[test]
fn race_done_task_short_circuits() {
    init_test_logging();
    driver::reset();

    let done = spawn(async { Ok("v") });
    let never = Signal::new();
    let raced = race(done, [never.clone()]);

    assert_eq!(
        raced.try_result().expect("already finished").expect("ok"),
        Some("v")
    );
    assert!(never.empty());
    driver::reset();
}

/// A timer scheduled at the current instant is observable before the
/// next resumption; a future one is not.
#[test]
fn timer_at_now_is_immediate() {
    init_test_logging();
    driver::reset();

    assert!(driver::at(driver::now()).triggered());
    assert!(!driver::at(driver::now() + Duration::from_nanos(1)).triggered());
    driver::reset();
}
