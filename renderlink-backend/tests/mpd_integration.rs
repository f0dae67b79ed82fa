//! MPD backend driven through a scripted server

mod helpers;

use std::time::{Duration, Instant};

use helpers::{track, ScriptedMpd};
use renderlink_backend::mpd::MpdBackend;
use renderlink_backend::{Backend, BackendCommand, BackendConfig};
use rstest::rstest;
use state_store::{CurrentTime, CurrentTrack, PlayerMode, PlayerStatus, StateDict, TracklistCurrent};

const STOPPED: &[&str] = &["state: stop", "repeat: 0", "random: 0", "single: 0", "volume: 50"];

fn owned_queue(conn: ScriptedMpd) -> MpdBackend<ScriptedMpd> {
    let conn = conn
        .reply("addid", &["Id: 5"])
        .reply("addid", &["Id: 6"])
        .reply("addid", &["Id: 7"]);
    let mut mpd = MpdBackend::with_connection(conn, "music.local", BackendConfig::default(), StateDict::new()).unwrap();

    let splice = BackendCommand::Splice {
        idx: None,
        del: None,
        tracks: vec![track("trk-1", Some(200.0)), track("trk-2", None), track("trk-3", Some(180.0))],
    };
    mpd.handle_msg(splice, Instant::now()).unwrap();
    mpd
}

#[test]
fn test_playing_song_maps_to_local_track() {
    let conn = ScriptedMpd::new().reply("status", STOPPED).reply(
        "status",
        &[
            "state: play",
            "song: 2",
            "songid: 7",
            "elapsed: 12.500",
            "duration: 180.000",
            "repeat: 0",
            "random: 0",
            "single: 0",
            "volume: 50",
        ],
    );
    let mut mpd = owned_queue(conn);
    let state = mpd.state().clone();

    mpd.ping(Instant::now() + Duration::from_secs(2)).unwrap();

    assert!(mpd.is_ours());
    let current = state.get_property::<CurrentTrack>().unwrap().0.unwrap();
    assert_eq!(current.id, "trk-3");
    assert!(current.can_pause && current.can_seek);

    let time = state.get_property::<CurrentTime>().unwrap();
    assert_eq!(time.time, 12.5);
    assert!((time.percentage - 0.0694).abs() < 0.001);
    assert_eq!(state.get_property::<PlayerStatus>(), Some(PlayerStatus::Playing));
    assert_eq!(state.get_property::<TracklistCurrent>(), Some(TracklistCurrent(Some("trk-3".into()))));
}

#[test]
fn test_id_map_survives_until_pruned() {
    let mut mpd = owned_queue(ScriptedMpd::new().reply("status", STOPPED));

    assert_eq!(mpd.ids().to_mpd("trk-1"), Some(5));
    assert_eq!(mpd.ids().to_local(6), Some("trk-2"));

    // deleting the first entry prunes its mapping, others stay
    let splice = BackendCommand::Splice { idx: Some(0), del: Some(1), tracks: vec![] };
    mpd.handle_msg(splice, Instant::now()).unwrap();

    assert_eq!(mpd.ids().to_mpd("trk-1"), None);
    assert_eq!(mpd.ids().to_mpd("trk-3"), Some(7));
    assert!(mpd.connection().sent.contains(&"delete 0:1".to_string()));
}

#[rstest]
#[case(PlayerMode::Normal, ["random 0", "repeat 0", "single 0"])]
#[case(PlayerMode::Repeat, ["random 0", "repeat 1", "single 0"])]
#[case(PlayerMode::Shuffle, ["random 1", "repeat 1", "single 0"])]
#[case(PlayerMode::One, ["random 0", "repeat 0", "single 1"])]
#[case(PlayerMode::Loop, ["random 0", "repeat 1", "single 1"])]
fn test_mode_switches(#[case] mode: PlayerMode, #[case] expected: [&str; 3]) {
    let conn = ScriptedMpd::new().reply("status", STOPPED);
    let mut mpd = MpdBackend::with_connection(conn, "music.local", BackendConfig::default(), StateDict::new()).unwrap();

    mpd.handle_msg(BackendCommand::SetMode { mode }, Instant::now()).unwrap();

    let switches: Vec<&str> = mpd
        .connection()
        .sent
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with("random") || l.starts_with("repeat") || l.starts_with("single"))
        .collect();
    assert_eq!(switches, expected);
}

#[test]
fn test_transport_commands() {
    let conn = ScriptedMpd::new().reply("status", STOPPED);
    let mut mpd = MpdBackend::with_connection(conn, "music.local", BackendConfig::default(), StateDict::new()).unwrap();
    let now = Instant::now();

    mpd.handle_msg(BackendCommand::Seek { time: 30.0 }, now).unwrap();
    mpd.handle_msg(BackendCommand::SetVolume { value: 0.25 }, now).unwrap();
    mpd.handle_msg(BackendCommand::Next, now).unwrap();
    mpd.handle_msg(BackendCommand::Stop, now).unwrap();

    let sent = &mpd.connection().sent;
    assert!(sent.iter().any(|l| l.starts_with("seekcur 30")));
    assert!(sent.contains(&"setvol 25".to_string()));
    assert!(sent.contains(&"stop".to_string()));
}

#[test]
fn test_foreign_playlist_is_mirrored() {
    let conn = ScriptedMpd::new()
        .reply("status", STOPPED)
        .reply("status", &["state: play", "song: 0", "songid: 41", "elapsed: 3.0", "duration: 60.0", "volume: 50"])
        .reply("playlistinfo", &["file: http://radio/stream.mp3", "Title: Morning Show", "duration: 60.0"]);
    let mut mpd = MpdBackend::with_connection(conn, "music.local", BackendConfig::default(), StateDict::new()).unwrap();

    mpd.ping(Instant::now()).unwrap();

    assert!(!mpd.is_ours());
    let current = mpd.state().get_property::<CurrentTrack>().unwrap().0.unwrap();
    assert_eq!(current.uri, "http://radio/stream.mp3");
    assert_eq!(current.title.as_deref(), Some("Morning Show"));
    assert!((mpd.state().get_property::<CurrentTime>().unwrap().percentage - 0.05).abs() < 1e-9);
}

#[test]
fn test_lost_connection_ends_backend() {
    let conn = ScriptedMpd::new().reply("status", STOPPED);
    let mut mpd = MpdBackend::with_connection(conn, "music.local", BackendConfig::default(), StateDict::new()).unwrap();

    mpd.connection_mut().hung_up = true;
    let result = mpd.ping(Instant::now());
    assert!(matches!(result, Err(renderlink_backend::BackendError::Disconnected)));
}
