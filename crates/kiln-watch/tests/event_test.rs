use std::fs;
use std::path::PathBuf;

use kiln_watch::{WatchEvent, WatchOp};
use notify::event::{
    AccessKind, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode,
};
use notify::{Event, EventKind};
use tempfile::TempDir;

fn event(kind: EventKind, path: &str) -> Event {
    Event::new(kind).add_path(PathBuf::from(path))
}

#[test]
fn content_changes_map_to_ops() {
    let cases = [
        (EventKind::Create(CreateKind::File), WatchOp::Create),
        (EventKind::Modify(ModifyKind::Data(DataChange::Content)), WatchOp::Write),
        (EventKind::Remove(RemoveKind::File), WatchOp::Remove),
        (EventKind::Modify(ModifyKind::Name(RenameMode::To)), WatchOp::Rename),
    ];
    for (kind, op) in cases {
        let label = format!("{kind:?}");
        let events = WatchEvent::from_notify(event(kind, "/p/hello/handler.py"));
        assert_eq!(events, vec![WatchEvent::new("/p/hello/handler.py", op)], "{label}");
    }
}

#[test]
fn metadata_and_access_are_not_qualifying() {
    let metadata = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions));
    assert!(WatchEvent::from_notify(event(metadata, "/p/a")).is_empty());
    let access = EventKind::Access(AccessKind::Any);
    assert!(WatchEvent::from_notify(event(access, "/p/a")).is_empty());
}

#[test]
fn one_event_per_path() {
    let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path(PathBuf::from("/p/old.py"))
        .add_path(PathBuf::from("/p/new.py"));

    let events = WatchEvent::from_notify(rename);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.op == WatchOp::Rename));
}

#[test]
fn created_folder_is_a_directory_event() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("sub");
    fs::create_dir(&dir).unwrap();

    let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path(dir.clone());
    let any = Event::new(EventKind::Create(CreateKind::Any)).add_path(dir.clone());

    for notify_event in [folder, any] {
        let events = WatchEvent::from_notify(notify_event);
        assert!(events[0].is_dir);
        assert!(events[0].adds_directory());
    }
    assert!(!WatchEvent::new(&dir, WatchOp::Write).adds_directory());
}
