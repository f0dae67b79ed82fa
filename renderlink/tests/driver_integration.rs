//! Driver behaviour with fake backends and a silent SSDP transport

mod helpers;

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use helpers::*;
use renderlink::websocket::connect;
use renderlink::{BackendCommand, RenderlinkError, Resource, ResourceClass, ServerInfo};
use serde_json::{json, Value};

const RENDERER: &str = "upnp-renderer://192.168.1.20:1400/xml/device_description.xml";
const MPD: &str = "mpd://192.168.1.30:6600";

#[test]
fn test_commands_reach_the_backend() {
    let mut link = renderlink();
    let (handle, log) = FakeBackend::handle(MPD);
    let sender = link.attach(handle).unwrap();

    sender.send(BackendCommand::Play).unwrap();
    sender.send(BackendCommand::SetVolume { value: 0.5 }).unwrap();
    assert!(link.tick(Instant::now()) >= 2);

    let log = log.lock().unwrap();
    assert_eq!(log.commands, vec![BackendCommand::Play, BackendCommand::SetVolume { value: 0.5 }]);
    assert_eq!(log.pings, 1);
    assert_eq!(link.state(MPD).unwrap().get("player", "volume"), Some(json!(0.5)));
}

#[test]
fn test_failed_backend_is_dropped_with_its_remote_entry() {
    let mut link = renderlink();
    link.registry()
        .add_remote(Resource::new(RENDERER, ResourceClass::Renderer));
    let (handle, log) = FakeBackend::handle(RENDERER);
    link.attach(handle).unwrap();

    link.tick(Instant::now());
    assert!(link.is_connected(RENDERER));

    log.lock().unwrap().broken = true;
    link.tick(Instant::now());

    assert!(!link.is_connected(RENDERER));
    assert!(log.lock().unwrap().destroyed);
    assert!(link.registry().remote(RENDERER).is_none());
    assert!(link.sender(RENDERER).is_none());
}

#[test]
fn test_quit_detaches_the_backend() {
    let mut link = renderlink();
    let (handle, log) = FakeBackend::handle(MPD);
    let sender = link.attach(handle).unwrap();

    sender.send(BackendCommand::Quit).unwrap();
    sender.send(BackendCommand::Play).unwrap();
    link.tick(Instant::now());

    assert_eq!(link.backends().count(), 0);
    let log = log.lock().unwrap();
    assert!(log.destroyed);
    assert_eq!(log.commands, vec![BackendCommand::Quit]);
}

#[test]
fn test_attach_and_disconnect_bookkeeping() {
    let mut link = renderlink();
    let (first, log) = FakeBackend::handle(MPD);
    let (duplicate, _) = FakeBackend::handle(MPD);
    link.attach(first).unwrap();

    assert!(matches!(link.attach(duplicate), Err(RenderlinkError::AlreadyConnected(_))));
    assert!(matches!(link.connect(MPD), Err(RenderlinkError::AlreadyConnected(_))));
    assert!(matches!(link.connect("rtsp://camera/stream"), Err(RenderlinkError::Backend(_))));

    link.disconnect(MPD).unwrap();
    assert!(log.lock().unwrap().destroyed);
    assert!(matches!(link.disconnect(MPD), Err(RenderlinkError::NotConnected(_))));
}

#[test]
fn test_run_until_returns_at_deadline() {
    let mut link = renderlink();
    let start = Instant::now();
    link.run_until(start + Duration::from_millis(200));

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn test_shutdown_destroys_backends() {
    let mut link = renderlink();
    let (handle, log) = FakeBackend::handle(MPD);
    link.attach(handle).unwrap();

    link.shutdown();
    assert!(log.lock().unwrap().destroyed);
}

/// Read messages until one satisfies `done`
fn wait_for<S>(client: &mut renderlink::websocket::Connection<S>, done: impl Fn(&Value) -> bool) -> Vec<Value>
where
    S: std::io::Read + std::io::Write,
{
    let start = Instant::now();
    let mut seen = Vec::new();
    while start.elapsed() < Duration::from_secs(5) {
        let batch = client.iteration(Instant::now()).unwrap();
        let found = batch.iter().any(&done);
        seen.extend(batch);
        if found {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    seen
}

#[test]
fn test_bridge_relays_state_and_commands() {
    let mut link = renderlink();
    let (handle, log) = FakeBackend::handle(MPD);
    link.attach(handle).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    link.serve(listener, Some("renderer"), ServerInfo::new("Test")).unwrap();

    let client = thread::spawn(move || {
        let mut ws = connect(&format!("ws://127.0.0.1:{}/ws/renderer", port), Duration::from_secs(5)).unwrap();
        let mut seen = wait_for(&mut ws, |m| m["event"] == "snapshot");

        ws.send_message(&json!({"cmd": "set_volume", "value": 0.25, "backend": MPD})).unwrap();
        seen.extend(wait_for(&mut ws, |m| m["event"] == "state_changed"));

        ws.send_message(&json!({"cmd": "quit"})).unwrap();
        ws.flush().unwrap();
        seen
    });

    let start = Instant::now();
    while !client.is_finished() && start.elapsed() < Duration::from_secs(10) {
        link.tick(Instant::now());
        thread::sleep(Duration::from_millis(5));
    }
    let seen = client.join().unwrap();

    let snapshot = seen.iter().find(|m| m["event"] == "snapshot").unwrap();
    assert_eq!(snapshot["backend"], MPD);
    assert_eq!(snapshot["state"]["player"]["status"], "stopped");

    let change = seen.iter().find(|m| m["event"] == "state_changed").unwrap();
    assert_eq!(change["backend"], MPD);
    assert_eq!(change["context"], "player");
    assert_eq!(change["variable"], "volume");
    assert_eq!(change["value"], 0.25);

    assert_eq!(log.lock().unwrap().commands, vec![BackendCommand::SetVolume { value: 0.25 }]);
}
