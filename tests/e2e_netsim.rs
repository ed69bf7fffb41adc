//! End-to-end network simulation scenarios.
//!
//! The simulator is the representative consumer of the runtime: typed
//! messages between identified peers over delayed (and optionally lossy)
//! channels, all on the virtual clock.

use std::time::Duration;

use simloop::net::{Channel, NetConfig, Network, Port};
use simloop::test_utils::{init_test_logging, Recorder, DEFAULT_TEST_SEED};
use simloop::{diagnostics, driver, spawn, ErrorKind, Task, Time};

fn elapsed() -> Duration {
    Duration::from_nanos(driver::now().duration_since(Time::GENESIS))
}

fn ping_server(id: u64, out: Channel<u32>, input: Port<u32>, rec: Recorder) -> Task<()> {
    spawn(async move {
        if id == 0 {
            out.send(0).join().await?;
        }
        let mut received = 0;
        while received < 5 {
            let msg = input.receive().join().await?;
            received += 1;
            rec.push(format!("{id} got {msg}"));
            out.send(msg + 1).join().await?;
        }
        Ok(())
    })
}

/// Two peers ping-pong a counter back and forth; each receives five
/// messages. Delivery order, payloads and the virtual timeline are all
/// deterministic.
#[test]
fn ping_pong_five_rounds() {
    init_test_logging();
    simloop::test_phase!("ping_pong_five_rounds");
    driver::reset();
    let rec = Recorder::new();

    let net: Network<u32> = Network::new(NetConfig::new(DEFAULT_TEST_SEED));
    ping_server(0, net.link(0u64, 1u64), net.input(0u64), rec.clone()).detach();
    ping_server(1, net.link(1u64, 0u64), net.input(1u64), rec.clone()).detach();

    driver::run();

    simloop::assert_with_log!(
        rec.entries().len() == 10,
        "both peers received five messages",
        10usize,
        rec.entries().len()
    );
    assert_eq!(
        rec.entries(),
        [
            "1 got 0", "0 got 1", "1 got 2", "0 got 3", "1 got 4", "0 got 5", "1 got 6",
            "0 got 7", "1 got 8", "0 got 9",
        ]
    );
    // ten link traversals at 20ms each dominate the timeline
    assert!(elapsed() >= Duration::from_millis(200));
    driver::reset();
    simloop::test_complete!("ping_pong_five_rounds");
}

/// The same seed replays the same virtual timeline.
#[test]
fn replay_is_deterministic() {
    init_test_logging();

    let mut timelines = Vec::new();
    for _ in 0..2 {
        driver::reset();
        let rec = Recorder::new();
        let net: Network<u32> = Network::new(NetConfig::new(77));
        ping_server(0, net.link(0u64, 1u64), net.input(0u64), rec.clone()).detach();
        ping_server(1, net.link(1u64, 0u64), net.input(1u64), rec.clone()).detach();
        driver::run();
        timelines.push((driver::now(), rec.entries()));
    }

    assert_eq!(timelines[0], timelines[1]);
    driver::reset();
}

/// A fully lossy link delivers nothing: the send completes (the sender
/// only waits out its busy delay), the receive stays suspended, and
/// teardown reclaims it.
#[test]
fn lossy_link_drops_messages() {
    init_test_logging();
    driver::reset();

    let net: Network<u8> = Network::new(NetConfig::new(7).loss(1.0));
    let sender = net.link(0u64, 1u64).send(9);
    let receiver = net.input(1u64).receive();

    driver::run();

    assert!(sender.done());
    assert!(!receiver.done());

    net.clear();
    driver::clear();
    driver::run();
    let err = receiver
        .try_result()
        .expect("receiver unwound")
        .expect_err("teardown reaches the suspended receive");
    assert_eq!(err.kind(), ErrorKind::Cleared);
    driver::reset();
}

/// Closing a port wakes the pending receive with `ChannelClosed`.
#[test]
fn closed_port_fails_pending_receive() {
    init_test_logging();
    driver::reset();

    let net: Network<u8> = Network::new(NetConfig::default());
    let port = net.input(2u64);
    let receiver = port.receive();

    driver::run();
    assert!(!receiver.done());

    port.close();
    driver::run();

    let err = receiver
        .try_result()
        .expect("receiver finished")
        .expect_err("closed port fails the receive");
    assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    driver::reset();
}

/// Messages queued before the receive are taken without suspending.
#[test]
fn queued_message_is_received_immediately() {
    init_test_logging();
    driver::reset();

    let net: Network<u8> = Network::new(NetConfig::new(3).link_delay(Duration::from_millis(5)));
    let sent = net.link(0u64, 1u64).send(42);
    driver::run();
    assert!(sent.done());
    assert_eq!(net.input(1u64).pending(), 1);

    let receiver = net.input(1u64).receive();
    // eager start: the queued message was taken synchronously
    assert_eq!(
        receiver.try_result().expect("finished").expect("ok"),
        42
    );
    driver::reset();
}

/// After the network and driver are cleared, nothing survives.
#[test]
fn network_teardown_releases_everything() {
    init_test_logging();
    driver::reset();

    let net: Network<u32> = Network::new(NetConfig::new(DEFAULT_TEST_SEED));
    let receiver = net.input(9u64).receive();
    driver::run();
    assert!(!receiver.done());

    net.clear();
    driver::clear();
    driver::run();

    assert!(receiver.done());
    drop(receiver);
    drop(net);
    assert_eq!(diagnostics::live_tasks(), 0);
    assert_eq!(diagnostics::live_signals(), 0);
}
