//! Tracklist state flowing into a watched dictionary

use std::collections::BTreeSet;

use state_store::prelude::*;
use state_store::{id_from_uri, TracklistCurrent, TracklistTracks};

fn queue() -> Vec<TrackInfo> {
    vec![
        TrackInfo::new("a", "http://media/a.flac"),
        TrackInfo::new("", "http://media/b.flac"),
    ]
}

#[test]
fn test_publish_emits_tracklist_events() {
    let dict = StateDict::new();
    dict.watch("player");

    let mut tracklist = Tracklist::with_seed(7);
    let accepted = tracklist.splice(None, None, queue()).unwrap();
    assert_eq!(accepted[1].id, id_from_uri("http://media/b.flac"));
    assert!(tracklist.set_current_by_id("a"));

    let changes = tracklist.publish(&dict);
    assert!(changes.list);
    assert!(changes.current);

    let variables: BTreeSet<(String, String)> = dict
        .changes()
        .try_iter()
        .map(|e| (e.context, e.variable))
        .collect();
    assert!(variables.contains(&("player/tracklist".to_string(), "tracks".to_string())));
    assert!(variables.contains(&("player/tracklist".to_string(), "current".to_string())));

    assert_eq!(dict.get_property::<TracklistCurrent>(), Some(TracklistCurrent(Some("a".to_string()))));
    assert_eq!(dict.get_property::<TracklistTracks>().map(|t| t.0.len()), Some(2));
}

#[test]
fn test_unchanged_tracklist_publishes_nothing() {
    let dict = StateDict::new();
    let mut tracklist = Tracklist::with_seed(7);
    tracklist.splice(None, None, queue()).unwrap();
    tracklist.publish(&dict);

    dict.watch_all();
    let changes = tracklist.publish(&dict);

    assert!(!changes.list);
    assert!(!changes.current);
    assert!(dict.changes().try_recv().is_none());
}

#[test]
fn test_duplicate_ids_are_dropped_on_insert() {
    let mut tracklist = Tracklist::with_seed(7);
    tracklist.splice(None, None, queue()).unwrap();

    let again = tracklist
        .splice(None, None, vec![TrackInfo::new("a", "http://media/other.flac")])
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(tracklist.len(), 2);
}
