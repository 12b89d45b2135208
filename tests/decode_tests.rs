//! End-to-end decoding of synthetic MIDI buffers.

mod common;

use common::{close, header, smf, var_len, TrackBuilder};
use midiroll_rs::midi::{decode, load_midi_file, ticks_to_seconds, RawNoteEvent, TrackEvent};
use midiroll_rs::DecodeError;

#[test]
fn test_var_len_helper_matches_decoder() {
    assert_eq!(var_len(0), [0x00]);
    assert_eq!(var_len(0x80), [0x81, 0x00]);
    assert_eq!(var_len(0x0FFF_FFFF), [0xFF, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn test_single_note_round_trip() {
    let track = TrackBuilder::new()
        .note_on(0, 0, 60, 100)
        .note_off(240, 0, 60)
        .end();
    let midi = decode(&smf(0, 480, &[track])).unwrap();

    assert_eq!(midi.format_type, 0);
    assert_eq!(midi.track_count, 1);
    assert_eq!(midi.time_division, 480);
    assert_eq!(midi.tracks.len(), 1);
    assert_eq!(
        midi.tracks[0].events,
        vec![TrackEvent::Note(RawNoteEvent {
            channel: 0,
            note_number: 60,
            velocity: 100,
            start_tick: 0,
            duration_ticks: 240,
        })]
    );
}

#[test]
fn test_running_status_yields_two_notes() {
    // Second note-on and both closing note-ons reuse status 0x93.
    let track = TrackBuilder::new()
        .event(0, &[0x93, 60, 80])
        .event(0, &[64, 90])
        .event(96, &[60, 0])
        .event(0, &[64, 0])
        .end();
    let midi = decode(&smf(0, 96, &[track])).unwrap();

    let notes: Vec<_> = midi.tracks[0].notes().copied().collect();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|n| n.channel == 3));
    assert!(notes.iter().all(|n| n.duration_ticks == 96));
    let mut keys: Vec<u8> = notes.iter().map(|n| n.note_number).collect();
    keys.sort();
    assert_eq!(keys, [60, 64]);
}

#[test]
fn test_truncated_track_length_field() {
    let mut data = header(0, 1, 96);
    data.extend_from_slice(b"MTrk");
    data.extend_from_slice(&[0x00, 0x00]);
    let err = decode(&data).unwrap_err();
    assert!(matches!(err, DecodeError::TruncatedStream { .. }));
}

#[test]
fn test_truncated_header() {
    let data = b"MThd\x00\x00\x00\x06\x00".to_vec();
    assert!(matches!(
        decode(&data).unwrap_err(),
        DecodeError::TruncatedStream { .. }
    ));
}

#[test]
fn test_names_default_and_override() {
    let named = TrackBuilder::new().name(0, "Piano").name(0, "Lead").end();
    let unnamed = TrackBuilder::new().note_on(0, 1, 40, 1).note_off(1, 1, 40);
    let midi = decode(&smf(1, 96, &[named, unnamed])).unwrap();
    assert_eq!(midi.tracks[0].name, "Lead");
    assert_eq!(midi.tracks[1].name, "Track 2");
}

#[test]
fn test_unknown_meta_is_skipped() {
    let track = TrackBuilder::new()
        .event(0, &[0xFF, 0x7F, 0x04, 1, 2, 3, 4])
        .event(0, &[0xFF, 0x58, 0x04, 4, 2, 24, 8])
        .note_on(0, 0, 72, 64)
        .note_off(10, 0, 72)
        .end();
    let midi = decode(&smf(0, 96, &[track])).unwrap();
    assert_eq!(midi.note_count(), 1);
}

#[test]
fn test_decoder_never_invents_tempo() {
    let track = TrackBuilder::new().note_on(0, 0, 60, 1).note_off(96, 0, 60);
    let midi = decode(&smf(0, 96, &[track])).unwrap();
    assert!(midi.tempo_events().is_empty());
    // The default appears only when converting.
    assert!(close(midi.duration_seconds(), 0.5));
}

#[test]
fn test_tempo_track_drives_other_tracks() {
    let conductor = TrackBuilder::new()
        .tempo(0, 500_000)
        .tempo(480, 250_000)
        .end();
    let melody = TrackBuilder::new()
        .note_on(480, 0, 67, 90)
        .note_off(480, 0, 67)
        .end();
    let midi = decode(&smf(1, 480, &[conductor, melody])).unwrap();

    let tempo = midi.tempo_events();
    let note = midi.tracks[1].notes().next().copied().unwrap();
    assert!(close(ticks_to_seconds(note.start_tick, &tempo, 480), 0.5));
    assert!(close(ticks_to_seconds(note.end_tick(), &tempo, 480), 0.75));
    assert_eq!(midi.last_tick(), 960);
    assert!(close(midi.duration_seconds(), 0.75));
}

#[test]
fn test_load_missing_file() {
    let err = load_midi_file("/nonexistent/definitely/missing.mid").unwrap_err();
    assert!(matches!(err, DecodeError::Io(_)));
}
