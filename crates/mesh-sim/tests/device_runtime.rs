//! Runtime scenarios: devices running their poll loops on tokio tasks,
//! wired together and driven through their primary links.

use std::time::Duration;

use mesh_link::{DuplexLink, PortId, SecondaryPort};
use mesh_protocol::{Button, Destination, Led, BLINK_LEDS};
use mesh_sim::{Device, DeviceConfig, DeviceEvent, DeviceHandle, RunState};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{sleep, timeout};

// ============================================================================
// Helper Functions
// ============================================================================

const P0: SecondaryPort = SecondaryPort::ALL[0];

/// Quiet console: no LED frames on the primary link
fn console_config() -> DeviceConfig {
    DeviceConfig {
        port_check_delay_ms: 100,
        show_listening: false,
        show_sending: false,
        ..DeviceConfig::default()
    }
}

fn spawn(name: &str, config: DeviceConfig) -> DeviceHandle {
    let device = Device::new(name, config).unwrap();
    let handle = device.handle();
    device.start();
    handle
}

fn attach_console(device: &DeviceHandle) -> DuplexLink {
    let console = DuplexLink::new();
    device.connect(PortId::Primary, &console).unwrap();
    console
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<DeviceEvent>, mut pred: F) -> DeviceEvent
where
    F: FnMut(&DeviceEvent) -> bool,
{
    let search = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    timeout(Duration::from_secs(120), search)
        .await
        .expect("timed out waiting for event")
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_round_in_progress() {
    let device = Device::new("alice", console_config()).unwrap();
    let handle = device.handle();
    let console = attach_console(&handle);
    let mut events = handle.subscribe();

    // Ten blinks keep the round busy for ten seconds
    console.write(b"MSG,blink leds,alice,console\n").unwrap();
    let task = device.start();
    wait_for(&mut events, |e| {
        matches!(e, DeviceEvent::MessageReceived { envelope, .. } if envelope.content == BLINK_LEDS)
    })
    .await;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), RunState::Running);

    handle.stop();
    timeout(Duration::from_secs(2), handle.wait_stopped())
        .await
        .expect("device did not stop");
    task.await.unwrap();

    assert_eq!(handle.state(), RunState::Stopped);
    assert!(!console.is_connected());
    assert!(!handle.ports().is_connected(PortId::Primary));
}

#[tokio::test(start_paused = true)]
async fn test_step_runs_one_round() {
    let device = Device::new("alice", console_config()).unwrap();
    let handle = device.handle();
    let console = attach_console(&handle);
    let mut events = handle.subscribe();
    device.start();

    handle.pause();
    wait_for(&mut events, |e| *e == DeviceEvent::Paused).await;

    console.write(b"PING\n").unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(console.available(), 0);

    handle.step();
    wait_for(&mut events, |e| *e == DeviceEvent::Stepped).await;
    let reply = timeout(Duration::from_secs(5), console.read_line())
        .await
        .expect("no reply after step")
        .unwrap();
    assert_eq!(reply, "PONG");

    // Paused again once the stepped round finishes
    wait_for(&mut events, |e| *e == DeviceEvent::Paused).await;
    assert_eq!(handle.state(), RunState::Paused);

    handle.resume();
    wait_for(&mut events, |e| *e == DeviceEvent::Resumed).await;

    handle.stop();
    handle.wait_stopped().await;
}

// ============================================================================
// Messaging between devices
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_known_only_button_without_routes_sends_nothing() {
    let alice = spawn("alice", console_config());
    let console = attach_console(&alice);
    let mut events = alice.subscribe();

    console.write(b"B2,1\n").unwrap();
    wait_for(&mut events, |e| *e == DeviceEvent::ButtonPressed(Button::Two)).await;
    sleep(Duration::from_secs(5)).await;

    loop {
        match events.try_recv() {
            Ok(event) => assert!(event.send_port().is_none(), "unexpected send: {event:?}"),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    alice.stop();
    alice.wait_stopped().await;
}

#[tokio::test(start_paused = true)]
async fn test_button_press_blinks_neighbour() {
    let alice = spawn("alice", console_config());
    let bob = spawn("bob", DeviceConfig::default());
    alice.connect_to(P0, &bob, P0).unwrap();

    let console = attach_console(&alice);
    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    console.write(b"B1,1\n").unwrap();
    wait_for(&mut alice_events, |e| *e == DeviceEvent::ButtonPressed(Button::One)).await;

    let received = wait_for(&mut bob_events, |e| {
        matches!(e, DeviceEvent::MessageReceived { .. })
    })
    .await;
    let DeviceEvent::MessageReceived { port, envelope } = received else {
        unreachable!()
    };
    assert_eq!(port, PortId::Secondary(P0));
    assert_eq!(envelope.content, BLINK_LEDS);
    assert_eq!(envelope.destination, Destination::All);
    assert_eq!(envelope.sender, "alice");

    // Bob blinks every LED, starting with the first
    wait_for(&mut bob_events, |e| {
        *e == DeviceEvent::Led { led: Led::Tx, on: true }
    })
    .await;

    let sent = wait_for(&mut alice_events, |e| {
        matches!(e, DeviceEvent::MessageSent { port, .. } if *port == P0)
    })
    .await;
    let DeviceEvent::MessageSent { attempts, .. } = sent else {
        unreachable!()
    };
    assert!(attempts <= 20);

    assert_eq!(bob.routing_table().get(0).unwrap(), "alice");
    assert_eq!(alice.routing_table().get(0).unwrap(), "UNKNOWN");

    alice.stop();
    bob.stop();
    alice.wait_stopped().await;
    bob.wait_stopped().await;
}

#[tokio::test(start_paused = true)]
async fn test_default_config_devices_complete_handshake() {
    let alice = spawn("alice", DeviceConfig::default());
    let bob = spawn("bob", DeviceConfig::default());
    alice.connect_to(P0, &bob, P0).unwrap();
    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    // Every delay is 500 ms on both sides, so timers on the two devices
    // keep firing in the same tick
    sleep(Duration::from_millis(1500)).await;
    alice.send_on(P0, Destination::Device("bob".into()), "hello").unwrap();

    let event = timeout(
        Duration::from_secs(10),
        wait_for(&mut bob_events, |e| matches!(e, DeviceEvent::MessageReceived { .. })),
    )
    .await
    .expect("handshake never completed");
    let DeviceEvent::MessageReceived { port, envelope } = event else {
        unreachable!()
    };
    assert_eq!(port, PortId::Secondary(P0));
    assert_eq!(envelope.content, "hello");
    assert_eq!(envelope.sender, "alice");
    assert_eq!(bob.routing_table().get(0).unwrap(), "alice");

    let sent = wait_for(&mut alice_events, |e| {
        matches!(e, DeviceEvent::MessageSent { .. } | DeviceEvent::SendFailed { .. })
    })
    .await;
    assert!(matches!(sent, DeviceEvent::MessageSent { port, .. } if port == P0));

    alice.stop();
    bob.stop();
    alice.wait_stopped().await;
    bob.wait_stopped().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_on_port_then_reply_by_name() {
    let alice = spawn("alice", DeviceConfig::default());
    let bob = spawn("bob", DeviceConfig::default());
    alice.connect_to(P0, &bob, P0).unwrap();
    let mut bob_events = bob.subscribe();
    let mut routes = bob.routes();

    alice
        .send_on(P0, Destination::Device("bob".into()), "green on")
        .unwrap();

    wait_for(&mut bob_events, |e| {
        matches!(e, DeviceEvent::MessageReceived { envelope, .. } if envelope.content == "green on")
    })
    .await;
    timeout(
        Duration::from_secs(5),
        routes.wait_for(|table| table.get(0) == Ok("alice")),
    )
    .await
    .expect("route not learned")
    .unwrap();

    // Bob now knows alice and can reach her by name
    let mut alice_events = alice.subscribe();
    bob.send(Destination::Device("alice".into()), "white on").unwrap();
    let event = wait_for(&mut alice_events, |e| {
        matches!(e, DeviceEvent::MessageReceived { .. })
    })
    .await;
    let DeviceEvent::MessageReceived { port, envelope } = event else {
        unreachable!()
    };
    assert_eq!(port, PortId::Secondary(P0));
    assert_eq!(envelope.sender, "bob");
    assert_eq!(alice.routing_table().get(0).unwrap(), "bob");

    alice.stop();
    bob.stop();
}

#[tokio::test(start_paused = true)]
async fn test_unconnected_device_survives_broadcast() {
    let alice = spawn("alice", console_config());
    let mut events = alice.subscribe();

    alice.send(Destination::All, "cycle leds").unwrap();
    for _ in 0..4 {
        let event = wait_for(&mut events, |e| e.send_port().is_some()).await;
        assert!(matches!(event, DeviceEvent::SendFailed { attempts: 0, .. }));
    }
    assert_eq!(alice.state(), RunState::Running);

    alice.stop();
    alice.wait_stopped().await;
}
