//! End-to-end tests of the SSDP engine over an in-memory transport

mod helpers;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use helpers::{engine, m_search, peer, renderer_notify};
use renderlink_discovery::{
    multicast_group, uri_to_uuid, AnnounceState, Resource, ResourceClass, ResourceEvent,
    ResourcePriority, ResourceRegistry, SsdpConfig,
};

const LOCAL_RENDERER: &str = "upnp-renderer://192.168.1.5:8080/upnp/renderer/desc.xml";

fn quiet_config() -> SsdpConfig {
    SsdpConfig::default().with_search(false)
}

#[test]
fn test_alive_notify_creates_remote_once() {
    let registry = ResourceRegistry::new();
    let events = registry.events();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    let notify = renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 1800);
    transport.push_multicast(&notify, peer());
    transport.push_multicast(&notify, peer());
    engine.update(start);

    let remote = registry.remote("upnp-renderer://10.0.0.5:1900/desc.xml").unwrap();
    assert_eq!(remote.class, ResourceClass::Renderer);
    assert_eq!(remote.priority, ResourcePriority::Default);
    assert_eq!(remote.expire_time, Some(start + Duration::from_secs(1800)));

    let added: Vec<_> = events
        .try_iter()
        .filter(|e| matches!(e, ResourceEvent::RemoteAdded(_)))
        .collect();
    assert_eq!(added.len(), 1);
}

#[test]
fn test_refresh_then_expire() {
    let registry = ResourceRegistry::new();
    let events = registry.events();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);
    let uri = "upnp-renderer://10.0.0.5:1900/desc.xml";

    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 60), peer());
    engine.update(start);

    let later = start + Duration::from_secs(30);
    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 60), peer());
    engine.update(later);
    assert_eq!(registry.remote(uri).unwrap().expire_time, Some(later + Duration::from_secs(60)));

    // the original expiry passes without effect
    engine.update(start + Duration::from_secs(61));
    assert!(registry.remote(uri).is_some());

    engine.update(later + Duration::from_secs(60));
    assert!(registry.remote(uri).is_none());

    let deleted: Vec<_> = events
        .try_iter()
        .filter(|e| matches!(e, ResourceEvent::RemoteDeleted(_)))
        .collect();
    assert_eq!(deleted.len(), 1);
}

#[test]
fn test_byebye_removes_remote() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 1800), peer());
    engine.update(start);
    assert_eq!(registry.remote_resources().len(), 1);

    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:byebye", 1800), peer());
    engine.update(start + Duration::from_secs(1));
    assert!(registry.remote_resources().is_empty());

    // byebye for an unknown device is a no-op
    transport.push_multicast(&renderer_notify("http://10.0.0.9:1900/desc.xml", "ssdp:byebye", 1800), peer());
    engine.update(start + Duration::from_secs(2));
    assert!(registry.remote_resources().is_empty());
}

#[test]
fn test_alive_without_max_age_is_dropped() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 0), peer());
    transport.push_multicast(
        "NOTIFY * HTTP/1.1\r\nNT: urn:schemas-upnp-org:device:MediaRenderer:1\r\nNTS: ssdp:alive\r\nLOCATION: http://10.0.0.6/d.xml\r\n\r\n",
        peer(),
    );
    engine.update(start);
    assert!(registry.remote_resources().is_empty());
}

#[test]
fn test_oversized_max_age_is_dropped() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    let notify = renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 1800)
        .replace("max-age=1800", "max-age=9223372036854775807");
    transport.push_multicast(&notify, peer());
    engine.update(start);
    assert!(registry.remote_resources().is_empty());

    // the engine keeps working afterwards
    transport.push_multicast(&renderer_notify("http://10.0.0.5:1900/desc.xml", "ssdp:alive", 1800), peer());
    engine.update(start);
    assert_eq!(registry.remote_resources().len(), 1);
}

#[test]
fn test_malformed_and_unrelated_datagrams_are_ignored() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_multicast("complete garbage", peer());
    transport.push_multicast("NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n\r\n", peer());
    transport.push_multicast(
        "NOTIFY * HTTP/1.1\r\nCACHE-CONTROL: max-age=100\r\nLOCATION: http://10.0.0.7/d.xml\r\nNT: urn:schemas-upnp-org:device:Printer:1\r\nNTS: ssdp:alive\r\n\r\n",
        peer(),
    );
    transport.push_multicast("M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n", peer());

    assert_eq!(engine.update(start), 4);
    assert!(registry.remote_resources().is_empty());
    assert!(engine.unicast_queue().is_empty());
}

#[test]
fn test_gmerlin_notify_keeps_location_and_max_priority() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_multicast(
        "NOTIFY * HTTP/1.1\r\n\
         CACHE-CONTROL: max-age=1800\r\n\
         LOCATION: gmerlin-renderer://10.0.0.8:10101/ws/renderer\r\n\
         NT: URN:GMERLIN-SOURCEFORGE-NET:DEVICE:MEDIARENDERER:\r\n\
         NTS: ssdp:alive\r\n\
         GMERLIN-ID: deadbeef\r\n\r\n",
        peer(),
    );
    engine.update(start);

    let remote = registry.remote("gmerlin-renderer://10.0.0.8:10101/ws/renderer").unwrap();
    assert_eq!(remote.priority, ResourcePriority::Max);
    assert_eq!(remote.hash.as_deref(), Some("deadbeef"));
}

#[test]
fn test_search_response_creates_server() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_unicast(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=120\r\n\
         EXT:\r\n\
         LOCATION: http://10.0.0.3:49152/description.xml\r\n\
         ST: urn:schemas-upnp-org:device:MediaServer:1\r\n\
         USN: uuid:abc::urn:schemas-upnp-org:device:MediaServer:1\r\n\r\n",
        peer(),
    );
    transport.push_unicast("HTTP/1.1 404 Not Found\r\nST: x\r\nLOCATION: http://x/\r\n\r\n", peer());
    engine.update(start);

    let resources = registry.remote_resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, "upnp-server://10.0.0.3:49152/description.xml");
    assert_eq!(resources[0].class, ResourceClass::MediaServer);
}

#[test]
fn test_own_announcements_are_suppressed() {
    let registry = ResourceRegistry::new();
    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer));
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    transport.push_multicast(
        &renderer_notify("http://192.168.1.5:8080/upnp/renderer/desc.xml", "ssdp:alive", 1800),
        "192.168.1.5:1900".parse().unwrap(),
    );
    engine.update(start);
    assert!(registry.remote_resources().is_empty());
}

#[test]
fn test_search_all_replies_for_local_renderer() {
    let registry = ResourceRegistry::new();
    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer).with_hash("cafe"));
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    // register the device with the engine
    engine.update(start);
    let uuid = uri_to_uuid(LOCAL_RENDERER);

    let searcher = "10.0.0.20:50000".parse().unwrap();
    transport.push_multicast(&m_search("ssdp:all", 3), searcher);
    engine.update(start);

    let queue = engine.unicast_queue();
    assert_eq!(queue.len(), 6);
    let mut usns = HashSet::new();
    for entry in queue {
        assert_eq!(entry.addr, searcher);
        let send_at = entry.send_at.unwrap();
        assert!(send_at >= start && send_at <= start + Duration::from_secs(3));
        let msg = http_codec::HttpMessage::parse(&entry.message).unwrap();
        assert_eq!(msg.status(), Some(200));
        assert_eq!(msg.header("LOCATION"), Some("http://192.168.1.5:8080/upnp/renderer/desc.xml"));
        usns.insert(msg.header("USN").unwrap().to_string());
    }
    assert!(usns.contains(&format!("uuid:{}::upnp:rootdevice", uuid)));
    assert!(usns.contains(&format!("uuid:{}", uuid)));
    assert!(usns.contains(&format!("uuid:{}::urn:schemas-upnp-org:device:MediaRenderer:1", uuid)));
    assert!(usns.contains(&format!("uuid:{}::urn:schemas-upnp-org:service:AVTransport:1", uuid)));

    // replies leave once due, directly to the searcher
    transport.clear_sent();
    engine.update(start + Duration::from_secs(3));
    assert!(engine.unicast_queue().is_empty());
    let replies: Vec<_> = transport
        .sent_messages()
        .into_iter()
        .filter(|(msg, _)| msg.status() == Some(200))
        .collect();
    assert_eq!(replies.len(), 6);
    assert!(replies.iter().all(|(_, addr)| *addr == searcher));
}

#[test]
fn test_search_mx_is_clamped() {
    let registry = ResourceRegistry::new();
    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer));
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);
    engine.update(start);

    transport.push_multicast(&m_search("upnp:rootdevice", 120), peer());
    transport.push_multicast(&m_search("upnp:rootdevice", 120), peer());
    transport.push_multicast(&m_search("upnp:rootdevice", 120), peer());
    engine.update(start);

    assert_eq!(engine.unicast_queue().len(), 3);
    for entry in engine.unicast_queue() {
        assert!(entry.send_at.unwrap() <= start + Duration::from_secs(5));
    }
}

#[test]
fn test_search_with_zero_mx_is_dropped() {
    let registry = ResourceRegistry::new();
    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer));
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);
    engine.update(start);

    transport.push_multicast(&m_search("ssdp:all", 0), peer());
    engine.update(start);
    assert!(engine.unicast_queue().is_empty());

    transport.push_multicast(&m_search("upnp:rootdevice", 1), peer());
    engine.update(start);
    assert_eq!(engine.unicast_queue().len(), 1);
    assert!(engine.unicast_queue()[0].send_at.unwrap() <= start + Duration::from_secs(1));
}

#[test]
fn test_announcement_schedule() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer));
    engine.update(start);

    let first = engine.announcement(LOCAL_RENDERER).unwrap().next_notify;
    let delay = first - start;
    assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(100));

    // three announcements in the burst, then the steady interval
    let mut now = first;
    for count in 1..=3 {
        engine.update(now);
        let announcement = engine.announcement(LOCAL_RENDERER).unwrap();
        assert_eq!(announcement.notify_count, count);
        assert_eq!(announcement.state, AnnounceState::Announcing);
        let gap = announcement.next_notify - now;
        assert!(gap >= Duration::from_secs(1) && gap <= Duration::from_secs(3));
        now = announcement.next_notify;
    }

    engine.update(now);
    let announcement = engine.announcement(LOCAL_RENDERER).unwrap();
    assert_eq!(announcement.notify_count, 0);
    assert_eq!(announcement.state, AnnounceState::Steady);
    let gap = announcement.next_notify - now;
    assert!(gap >= Duration::from_secs(100) && gap <= Duration::from_secs(900));

    // drain the multicast queue past the rate limit
    let mut t = now;
    for _ in 0..100 {
        t += Duration::from_millis(100);
        engine.update(t);
    }
    assert_eq!(engine.multicast_queue_len(), 0);

    let notifies: Vec<_> = transport
        .sent_messages()
        .into_iter()
        .filter(|(msg, addr)| msg.method() == Some("NOTIFY") && *addr == multicast_group())
        .collect();
    assert_eq!(notifies.len(), 4 * 6);
    assert!(notifies.iter().all(|(msg, _)| msg.header("NTS") == Some("ssdp:alive")));
}

#[test]
fn test_removed_local_device_sends_byebye() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    registry.add_local(Resource::new("gmerlin-renderer://192.168.1.5:10101/ws/renderer", ResourceClass::Renderer));
    engine.update(start);
    assert_eq!(engine.announcements().count(), 1);

    registry.remove_local("gmerlin-renderer://192.168.1.5:10101/ws/renderer");
    engine.update(start);
    assert_eq!(engine.announcements().count(), 0);

    let mut t = start;
    for _ in 0..10 {
        t += Duration::from_millis(200);
        engine.update(t);
    }
    let byebyes: Vec<_> = transport
        .sent_messages()
        .into_iter()
        .filter(|(msg, _)| msg.header("NTS") == Some("ssdp:byebye"))
        .collect();
    assert_eq!(byebyes.len(), 1);
    assert_eq!(
        byebyes[0].0.header("LOCATION"),
        Some("gmerlin-renderer://192.168.1.5:10101/ws/renderer")
    );
}

#[test]
fn test_shutdown_flushes_byebye_group() {
    let registry = ResourceRegistry::new();
    registry.add_local(Resource::new(LOCAL_RENDERER, ResourceClass::Renderer));
    registry.add_local(Resource::new("upnp-server://192.168.1.5:8080/upnp/server/desc.xml", ResourceClass::MediaServer));
    registry.add_local(Resource::new("mpd://localhost:6600", ResourceClass::Renderer));
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, quiet_config(), start);

    engine.update(start);
    assert_eq!(engine.announcements().count(), 2);

    let sent = engine.shutdown();
    assert_eq!(sent, 6 + 5);

    let messages = transport.sent_messages();
    assert_eq!(messages.len(), 11);
    assert!(messages
        .iter()
        .all(|(msg, addr)| msg.header("NTS") == Some("ssdp:byebye") && *addr == multicast_group()));
}

#[test]
fn test_search_requests_go_out() {
    let registry = ResourceRegistry::new();
    let start = Instant::now();
    let (mut engine, transport) = engine(&registry, SsdpConfig::default(), start);

    engine.update(start);
    assert_eq!(engine.multicast_queue_len(), 1);

    engine.update(engine.next_multicast_time());
    let messages = transport.sent_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0.method(), Some("M-SEARCH"));
    assert_eq!(messages[0].0.header("ST"), Some("ssdp:all"));
    assert_eq!(messages[0].1, multicast_group());
}
