//! End-to-end record/play scenarios against real temporary directory trees.

use md5::{Digest, Md5};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tartape::{Event, EntryKind, Tape, TapePlayer, TapeRecorder, TartapeError};

fn record(root: &Path) -> [u8; 16] {
    TapeRecorder::new(root).commit().unwrap()
}

fn play_bytes(tape: &Tape, root: &Path, start: u64) -> Vec<u8> {
    let player = TapePlayer::new(tape, root);
    let mut out = Vec::new();
    for event in player.play(start).unwrap() {
        if let Event::FileData { bytes } = event.unwrap() {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

#[test]
fn empty_directory_stream_length() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("D")).unwrap();
    record(tmp.path());

    let tape = Tape::discover(tmp.path()).unwrap();
    assert_eq!(tape.entry_count(), 1);
    assert_eq!(tape.stream_len(), 1536);

    let player = TapePlayer::new(&tape, tmp.path());
    match player.play(0).unwrap().next().unwrap().unwrap() {
        Event::FileStart { entry, .. } => {
            assert_eq!(entry.arc_path, b"D/");
            assert_eq!(entry.kind, EntryKind::Dir);
        }
        other => panic!("expected FileStart, got {other:?}"),
    }
}

#[test]
fn zero_byte_file_stream_length() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("D")).unwrap();
    fs::write(tmp.path().join("D/empty"), b"").unwrap();
    record(tmp.path());

    let tape = Tape::discover(tmp.path()).unwrap();
    assert_eq!(tape.stream_len(), 2048);
}

#[test]
fn one_byte_file_digest_and_stream_length() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("D")).unwrap();
    fs::write(tmp.path().join("D/a"), b"A").unwrap();
    record(tmp.path());

    let tape = Tape::discover(tmp.path()).unwrap();
    assert_eq!(tape.stream_len(), 2560);

    let player = TapePlayer::new(&tape, tmp.path());
    let mut found = None;
    for event in player.play(0).unwrap() {
        if let Event::FileEnd { entry, md5, .. } = event.unwrap() {
            if entry.arc_path == b"D/a" {
                found = md5;
            }
        }
    }
    let expected: [u8; 16] = Md5::digest(b"A").into();
    assert_eq!(found.unwrap(), expected);
}

#[test]
fn resume_mid_padding_matches_worked_example() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), vec![b'x'; 1000]).unwrap();
    fs::write(tmp.path().join("b.txt"), b"hi").unwrap();
    record(tmp.path());
    let tape = Tape::discover(tmp.path()).unwrap();

    // a.txt: header [0,512), body [512,1512), padding [1512,1536), 24 bytes
    // of padding total. Resuming 12 bytes into the padding leaves 12 zero
    // bytes still to emit before b.txt's header.
    let player = TapePlayer::new(&tape, tmp.path());
    let mut events = player.play(1512 + 12).unwrap();

    match events.next().unwrap().unwrap() {
        Event::FileStart { entry, resumed, .. } => {
            assert_eq!(entry.arc_path, b"a.txt");
            assert!(resumed);
        }
        other => panic!("expected FileStart, got {other:?}"),
    }
    match events.next().unwrap().unwrap() {
        Event::FileData { bytes } => assert_eq!(bytes, vec![0u8; 12]),
        other => panic!("expected FileData, got {other:?}"),
    }
    match events.next().unwrap().unwrap() {
        Event::FileEnd { entry, md5, .. } => {
            assert_eq!(entry.arc_path, b"a.txt");
            assert_eq!(md5, None);
        }
        other => panic!("expected FileEnd, got {other:?}"),
    }
    match events.next().unwrap().unwrap() {
        Event::FileStart { entry, resumed, .. } => {
            assert_eq!(entry.arc_path, b"b.txt");
            assert!(!resumed);
        }
        other => panic!("expected FileStart, got {other:?}"),
    }
}

#[test]
fn fail_fast_on_mtime_change() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
    record(tmp.path());
    let tape = Tape::discover(tmp.path()).unwrap();

    // mtime has only 1-second resolution through MetadataExt::mtime().
    std::thread::sleep(Duration::from_millis(1100));
    fs::write(tmp.path().join("a.txt"), b"hello").unwrap();

    let player = TapePlayer::new(&tape, tmp.path());
    let mut saw_integrity_error = false;
    for event in player.play(0).unwrap() {
        match event {
            Ok(_) => {}
            Err(TartapeError::Integrity { .. }) => {
                saw_integrity_error = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(saw_integrity_error);
}

#[test]
fn total_path_of_256_bytes_is_rejected_at_record_time() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("d")).unwrap();
    let filename = "f".repeat(254); // "d/" + 254 == 256 bytes total arc_path
    fs::write(tmp.path().join("d").join(&filename), b"x").unwrap();

    let err = TapeRecorder::new(tmp.path()).commit().unwrap_err();
    assert!(matches!(err, TartapeError::PathTooLong { .. }));
}

#[test]
fn directory_component_of_101_bytes_is_rejected_at_record_time() {
    let tmp = tempfile::tempdir().unwrap();
    let long_dir = "d".repeat(101);
    fs::create_dir(tmp.path().join(&long_dir)).unwrap();

    let err = TapeRecorder::new(tmp.path()).commit().unwrap_err();
    assert!(matches!(err, TartapeError::DirectoryNameTooLong { .. }));
}

#[test]
fn recording_is_deterministic_across_runs() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("dir")).unwrap();
    fs::write(tmp.path().join("dir/a.txt"), b"hello world").unwrap();
    fs::write(tmp.path().join("z.txt"), b"zzz").unwrap();

    let fp1 = record(tmp.path());
    let tape1 = Tape::discover(tmp.path()).unwrap();
    let bytes1 = play_bytes(&tape1, tmp.path(), 0);

    let fp2 = record(tmp.path());
    let tape2 = Tape::discover(tmp.path()).unwrap();
    let bytes2 = play_bytes(&tape2, tmp.path(), 0);

    assert_eq!(fp1, fp2);
    assert_eq!(bytes1, bytes2);
}

#[test]
fn resumption_law_holds_at_several_offsets() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("dir")).unwrap();
    fs::write(tmp.path().join("dir/a.txt"), vec![b'x'; 1000]).unwrap();
    fs::write(tmp.path().join("dir/b.txt"), b"short").unwrap();
    fs::write(tmp.path().join("z.txt"), b"").unwrap();
    record(tmp.path());
    let tape = Tape::discover(tmp.path()).unwrap();

    let full = play_bytes(&tape, tmp.path(), 0);
    assert_eq!(full.len() as u64, tape.stream_len());

    for &k in &[0u64, 1, 511, 512, 513, 1000, 1536, full.len() as u64] {
        let suffix = play_bytes(&tape, tmp.path(), k);
        assert_eq!(suffix, full[k as usize..], "resumption law violated at k={k}");
    }
}
