use crate::{
    event::{Category, EventKind, MetaMessage, MidiMessage, PitchBend, TextKind},
    handler::{Handler, Ignore},
    prelude::*,
    primitive::{Format, SmpteTime, Timing},
    sequence::{Sequence, SequenceBuilder, Track},
    smf::Reader,
    writer::Writer,
};
use pretty_assertions::assert_eq;

/// Every handler call, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Header(Format, u16, Timing),
    StartOfTrack(usize),
    Event(u32, EventKind),
    EndOfTrack(u32),
    Eof,
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<Call>,
}
impl Recorder {
    fn push(&mut self, delta: u28, kind: EventKind) {
        self.calls.push(Call::Event(delta.as_int(), kind));
    }
}
handler_via_push! {
    impl[] Recorder {
        fn header(&mut self, format: Format, track_count: u16, timing: Timing) {
            self.calls.push(Call::Header(format, track_count, timing));
        }

        fn start_of_track(&mut self, track: usize) {
            self.calls.push(Call::StartOfTrack(track));
        }

        fn end_of_track(&mut self, delta: u28) {
            self.calls.push(Call::EndOfTrack(delta.as_int()));
        }

        fn eof(&mut self) {
            self.calls.push(Call::Eof);
        }
    }
}

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut raw = id.to_vec();
    raw.extend_from_slice(&(body.len() as u32).to_be_bytes());
    raw.extend_from_slice(body);
    raw
}

fn smf(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&format.to_be_bytes());
    header.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    header.extend_from_slice(&division.to_be_bytes());
    let mut raw = chunk(b"MThd", &header);
    for track in tracks {
        raw.extend(chunk(b"MTrk", track));
    }
    raw
}

fn record(reader: Reader, raw: &[u8]) -> (Result<ReadReportSummary>, Vec<Call>) {
    let mut rec = Recorder::default();
    let res = reader.read(raw, &mut rec).map(|report| ReadReportSummary {
        tracks: report.tracks,
        skipped: report.skipped.len(),
        warnings: report.warnings.len(),
    });
    (res, rec.calls)
}

#[derive(Debug, PartialEq, Eq)]
struct ReadReportSummary {
    tracks: usize,
    skipped: usize,
    warnings: usize,
}

fn lenient(raw: &[u8]) -> Result<Sequence> {
    let mut builder = SequenceBuilder::new();
    Reader::new().strict(false).read(raw, &mut builder)?;
    Ok(builder.finish())
}

fn strict() -> Reader {
    Reader::new().strict(true)
}

fn note_on(channel: u8, key: u8, vel: u8) -> EventKind {
    EventKind::Midi {
        channel: u4::new(channel),
        message: MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        },
    }
}

fn note_off(channel: u8, key: u8, vel: u8) -> EventKind {
    EventKind::Midi {
        channel: u4::new(channel),
        message: MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(vel),
        },
    }
}

fn ticks(track: &Track) -> Vec<u64> {
    track.iter().map(|ev| ev.ticks()).collect()
}

const SIMPLE_TRACK: &[u8] = &[
    0x00, 0x90, 0x40, 0x40, 0x60, 0x80, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00,
];

/// A two-track file touching most event types.
fn rich_file() -> Vec<u8> {
    let conductor: &[u8] = &[
        0x00, 0xFF, 0x03, 0x04, b'S', b'o', b'n', b'g', //sequence name
        0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //tempo
        0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, //time signature
        0x00, 0xFF, 0x59, 0x02, 0xFE, 0x01, //key signature
        0x00, 0xFF, 0x54, 0x05, 0x61, 0x00, 0x00, 0x00, 0x00, //smpte offset
        0x00, 0xFF, 0x01, 0x03, b'a', b'b', b'c', //text
        0x00, 0xFF, 0x60, 0x01, 0x07, //unknown meta
        0x00, 0xFF, 0x51, 0x04, 0x00, 0x07, 0xA1, 0x20, //tempo with a bad length
        0x83, 0x60, 0xFF, 0x2F, 0x00,
    ];
    let lead: &[u8] = &[
        0x00, 0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd', //track name
        0x00, 0xC0, 0x05, //program change
        0x00, 0xB0, 0x7B, 0x00, //all notes off
        0x00, 0x90, 0x3C, 0x64, //note on
        0x60, 0x3C, 0x00, //running status
        0x00, 0xE0, 0x00, 0x40, //pitch bend
        0x00, 0xF0, 0x03, 0x7E, 0x7F, 0xF7, //sysex
        0x10, 0xA0, 0x3C, 0x20, //poly pressure
        0x00, 0xD0, 0x30, //channel pressure
        0x00, 0xF7, 0x02, 0xF8, 0xFA, //escape
        0x81, 0x00, 0xFF, 0x2F, 0x00,
    ];
    smf(1, 480, &[conductor, lead])
}

#[test]
fn header_only() {
    let raw = [
        0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x60,
    ];
    let (res, calls) = record(Reader::new().strict(false), &raw);
    assert_eq!(
        res.unwrap(),
        ReadReportSummary {
            tracks: 0,
            skipped: 0,
            warnings: 1,
        }
    );
    assert_eq!(
        calls,
        vec![
            Call::Header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96))),
            Call::Eof,
        ]
    );
    //Missing tracks are only tolerated in lenient mode
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn simple_track() {
    let raw = smf(0, 96, &[SIMPLE_TRACK]);
    let (res, calls) = record(strict(), &raw);
    res.unwrap();
    assert_eq!(
        calls,
        vec![
            Call::Header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96))),
            Call::StartOfTrack(0),
            Call::Event(0, note_on(0, 0x40, 0x40)),
            Call::Event(96, note_off(0, 0x40, 0x40)),
            Call::EndOfTrack(0),
            Call::Eof,
        ]
    );

    let seq = Sequence::parse(&raw).unwrap();
    assert_eq!(seq.tracks().len(), 1);
    let track = &seq.tracks()[0];
    assert_eq!(ticks(track), vec![0, 0, 96, 96]);
    assert_eq!(
        track
            .iter()
            .filter(|ev| ev.kind == EventKind::EndOfTrack)
            .count(),
        1
    );
    assert!(track.is_finished());
    assert!(track.iter().all(|ev| ev.track() == 0));
}

#[test]
fn running_status() {
    let explicit = smf(
        0,
        96,
        &[&[
            0x00, 0x90, 0x40, 0x40, 0x60, 0x90, 0x40, 0x00, 0x00, 0x91, 0x41, 0x7F, 0x00, 0xFF,
            0x2F, 0x00,
        ]],
    );
    let implicit = smf(
        0,
        96,
        &[&[
            0x00, 0x90, 0x40, 0x40, 0x60, 0x40, 0x00, 0x00, 0x91, 0x41, 0x7F, 0x00, 0xFF, 0x2F,
            0x00,
        ]],
    );
    let explicit = Sequence::parse(&explicit).unwrap();
    let implicit = Sequence::parse(&implicit).unwrap();
    assert_eq!(explicit, implicit);
    assert_eq!(explicit.tracks()[0].events()[2].kind, note_on(0, 0x40, 0));
}

#[test]
fn running_status_survives_meta_events() {
    let raw = smf(
        0,
        96,
        &[&[
            0x00, 0x90, 0x40, 0x40, 0x00, 0xFF, 0x01, 0x01, b'x', 0x10, 0x40, 0x00, 0x00, 0xFF,
            0x2F, 0x00,
        ]],
    );
    let seq = Sequence::parse(&raw).unwrap();
    assert_eq!(seq.tracks()[0].events()[3].kind, note_on(0, 0x40, 0));
    assert_eq!(seq.tracks()[0].events()[3].ticks(), 0x10);
}

#[test]
fn missing_running_status() {
    let raw = smf(0, 96, &[&[0x00, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00]]);
    let err = Sequence::parse(&raw).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MalformedValue(_)));
    assert_eq!(err.track(), Some(0));
    assert_eq!(err.offset(), Some(22));
    assert_eq!(
        err.to_string(),
        "malformed midi value: event missing status with no running status active (track 0, offset 0x16)"
    );
}

#[test]
fn chunk_length_mismatch() {
    //Declared one byte short, with another track right after
    let mut raw = smf(1, 96, &[]);
    raw[10..12].copy_from_slice(&[0, 2]);
    raw.extend_from_slice(b"MTrk\0\0\0\x0B");
    raw.extend_from_slice(SIMPLE_TRACK);
    raw.extend(chunk(b"MTrk", &[0x00, 0xFF, 0x2F, 0x00]));
    let err = lenient(&raw).unwrap_err();
    match err.kind() {
        ErrorKind::ChunkLengthMismatch { declared, consumed } => {
            assert_eq!((*declared, *consumed), (11, 12));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.track(), Some(0));
}

#[test]
fn truncated_track_chunk() {
    let mut raw = smf(0, 96, &[]);
    raw[10..12].copy_from_slice(&[0, 1]);
    raw.extend_from_slice(b"MTrk\0\0\0\x0E");
    raw.extend_from_slice(SIMPLE_TRACK);
    let err = lenient(&raw).unwrap_err();
    match err.kind() {
        ErrorKind::ChunkLengthMismatch { declared, consumed } => {
            assert_eq!((*declared, *consumed), (14, 12));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn unknown_chunks_are_skipped() {
    let mut raw = smf(0, 96, &[]);
    raw[10..12].copy_from_slice(&[0, 1]);
    raw.extend(chunk(b"XFIH", b"abc"));
    raw.extend(chunk(b"MTrk", SIMPLE_TRACK));
    raw.extend(chunk(b"XFKM", &[]));
    let (res, calls) = record(strict(), &raw);
    assert_eq!(
        res.unwrap(),
        ReadReportSummary {
            tracks: 1,
            skipped: 0,
            warnings: 0,
        }
    );
    assert_eq!(calls.len(), 6);
    assert_eq!(lenient(&raw).unwrap(), Sequence::parse(&smf(0, 96, &[SIMPLE_TRACK])).unwrap());
}

#[test]
fn bad_header() {
    let err = Sequence::parse(&chunk(b"MTrk", SIMPLE_TRACK)).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));

    let err = Sequence::parse(&smf(3, 96, &[SIMPLE_TRACK])).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));

    let err = Sequence::parse(&chunk(b"MThd", &[0, 0, 0, 1])).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));

    let err = Sequence::parse(&[]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));
}

#[test]
fn long_header() {
    let mut raw = chunk(b"MThd", &[0, 0, 0, 1, 0, 96, 0xAA, 0xBB]);
    raw.extend(chunk(b"MTrk", SIMPLE_TRACK));
    let seq = lenient(&raw).unwrap();
    assert_eq!(seq.timing(), Timing::Metrical(u15::new(96)));
    assert_eq!(seq.tracks().len(), 1);
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn smpte_division_is_preserved() {
    let raw = smf(0, 0xE728, &[SIMPLE_TRACK]);
    let seq = Sequence::parse(&raw).unwrap();
    assert_eq!(
        seq.timing(),
        Timing::Timecode {
            fps: 25,
            subframes: 40
        }
    );
    assert_eq!(seq.to_bytes().unwrap(), raw);
}

#[test]
fn sysex_continuation() {
    let raw = smf(
        0,
        96,
        &[&[
            0x00, 0xF0, 0x03, 0x43, 0x12, 0x00, //first packet
            0x60, 0xF7, 0x02, 0x34, 0xF7, //last packet
            0x00, 0xF7, 0x02, 0xF3, 0x01, //escape
            0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let (res, calls) = record(strict(), &raw);
    res.unwrap();
    assert_eq!(
        calls[2..5].to_vec(),
        vec![
            Call::Event(0x60, EventKind::SysEx(vec![0x43, 0x12, 0x00, 0x34, 0xF7])),
            Call::Event(0, EventKind::Escape(vec![0xF3, 0x01])),
            Call::EndOfTrack(0),
        ]
    );
}

#[test]
fn sysex_continuation_across_system_message() {
    let raw = smf(
        0,
        96,
        &[&[
            0x00, 0xF0, 0x02, 0x43, 0x10, //first packet
            0x0A, 0xF8, //clock
            0x05, 0xF7, 0x02, 0x11, 0xF7, //last packet
            0x00, 0x90, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let (res, calls) = record(Reader::new().strict(false), &raw);
    res.unwrap();
    assert_eq!(
        calls[2..4].to_vec(),
        vec![
            Call::Event(15, EventKind::SysEx(vec![0x43, 0x10, 0x11, 0xF7])),
            Call::Event(0, note_on(0, 0x40, 0x40)),
        ]
    );
    let seq = lenient(&raw).unwrap();
    assert_eq!(ticks(&seq.tracks()[0]), vec![0, 15, 15, 15]);
}

#[test]
fn unterminated_sysex() {
    let raw = smf(
        0,
        96,
        &[&[
            0x00, 0xF0, 0x02, 0x43, 0x12, 0x10, 0x90, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let sysex = Call::Event(0, EventKind::SysEx(vec![0x43, 0x12]));

    let (res, calls) = record(Reader::new().strict(false), &raw);
    res.unwrap();
    assert_eq!(
        calls[2..5].to_vec(),
        vec![
            sysex.clone(),
            Call::Event(0x10, note_on(0, 0x40, 0x40)),
            Call::EndOfTrack(0)
        ]
    );

    //Strict mode still delivers the payload before failing
    let (res, calls) = record(strict(), &raw);
    let err = res.unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnterminatedSysEx { len: 2 }
    ));
    assert_eq!(calls.last(), Some(&sysex));

    //Lenient mode reports it as a warning
    let report = Reader::new().strict(false).read(&raw, &mut Ignore).unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        report.warnings[0].kind(),
        ErrorKind::UnterminatedSysEx { len: 2 }
    ));
    assert_eq!(report.warnings[0].track(), Some(0));
}

#[test]
fn unterminated_sysex_at_end_of_track() {
    let raw = smf(0, 96, &[&[0x00, 0xF0, 0x01, 0x43, 0x05, 0xFF, 0x2F, 0x00]]);
    let (res, calls) = record(Reader::new().strict(false), &raw);
    res.unwrap();
    assert_eq!(
        calls[2..4].to_vec(),
        vec![
            Call::Event(0, EventKind::SysEx(vec![0x43])),
            Call::EndOfTrack(5)
        ]
    );
}

#[test]
fn system_messages_are_skipped() {
    let raw = smf(
        0,
        96,
        &[&[0x05, 0xF8, 0x10, 0x90, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00]],
    );
    let seq = lenient(&raw).unwrap();
    let events = seq.tracks()[0].events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].kind, note_on(0, 0x40, 0x40));
    assert_eq!(events[1].delta(), 0x15);
    assert_eq!(events[1].ticks(), 0x15);
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn system_messages_reach_invalid_event() {
    #[derive(Default)]
    struct Invalid(Vec<(u32, u8, Vec<u8>)>);
    impl Handler for Invalid {
        fn invalid_event(&mut self, delta: u28, status: u8, data: &[u8]) {
            self.0.push((delta.as_int(), status, data.to_vec()));
        }
    }
    let raw = smf(
        0,
        96,
        &[&[
            0x05, 0xF8, 0x03, 0xF2, 0x01, 0x02, 0x10, 0x90, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let mut invalid = Invalid::default();
    let report = Reader::new()
        .strict(false)
        .read(&raw, &mut invalid)
        .unwrap();
    assert_eq!(
        invalid.0,
        vec![(5, 0xF8, vec![]), (3, 0xF2, vec![0x01, 0x02])]
    );
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(report.warnings[1].offset(), Some(24));

    //Handlers that drop them keep every other event in place
    let seq = lenient(&raw).unwrap();
    assert_eq!(seq.tracks()[0].events()[1].delta(), 0x18);
    assert_eq!(ticks(&seq.tracks()[0]), vec![0, 0x18, 0x18]);
}

#[test]
fn trailing_bytes_after_end_of_track() {
    let raw = smf(0, 96, &[&[0x00, 0xFF, 0x2F, 0x00, 0x00, 0x00]]);
    let seq = lenient(&raw).unwrap();
    assert_eq!(seq.tracks()[0].len(), 2);
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn missing_end_of_track() {
    let raw = smf(0, 96, &[&[0x00, 0x90, 0x40, 0x40]]);
    let seq = lenient(&raw).unwrap();
    assert!(seq.tracks()[0].is_finished());
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn singletrack_with_several_tracks() {
    let eot: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
    let raw = smf(0, 96, &[eot, eot]);
    let seq = lenient(&raw).unwrap();
    assert_eq!(seq.tracks().len(), 2);
    assert_eq!(seq.format(), Format::Parallel);
    let report = Reader::new().strict(false).read(&raw, &mut Ignore).unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        report.warnings[0].kind(),
        ErrorKind::InvalidFormat(_)
    ));
    let err = strict().read(&raw, &mut Ignore).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));
}

#[test]
fn overlong_track_chunk_is_reported() {
    //The first track claims two bytes of the next chunk header, hiding the second track
    let mut raw = smf(1, 96, &[]);
    raw[10..12].copy_from_slice(&[0, 2]);
    raw.extend_from_slice(b"MTrk\0\0\0\x0E");
    raw.extend_from_slice(SIMPLE_TRACK);
    raw.extend(chunk(b"MTrk", SIMPLE_TRACK));

    let mut rec = Recorder::default();
    let report = Reader::new().strict(false).read(&raw, &mut rec).unwrap();
    assert_eq!(report.tracks, 1);
    let messages: Vec<_> = report
        .warnings
        .iter()
        .map(|err| err.kind().message())
        .collect();
    assert_eq!(
        messages,
        vec![
            Some("found bytes after the end of track"),
            Some("chunk runs past the end of the file"),
            Some("file has less tracks than declared"),
        ]
    );
    assert_eq!(report.warnings[0].track(), Some(0));
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn track_count_disagreement() {
    let mut raw = smf(1, 96, &[SIMPLE_TRACK, SIMPLE_TRACK]);
    raw[10..12].copy_from_slice(&[0, 1]);
    let seq = lenient(&raw).unwrap();
    assert_eq!(seq.tracks().len(), 2);
    assert!(strict().read(&raw, &mut Ignore).is_err());
}

#[test]
fn recover_from_broken_track() {
    let broken: &[u8] = &[0x00, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00];
    let raw = smf(1, 96, &[broken, SIMPLE_TRACK]);

    let mut builder = SequenceBuilder::new();
    let report = Reader::new()
        .recover(true)
        .read(&raw, &mut builder)
        .unwrap();
    assert_eq!(report.tracks, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].track(), Some(0));

    let seq = builder.finish();
    assert_eq!(seq.tracks().len(), 2);
    assert_eq!(seq.tracks()[0].len(), 2);
    assert!(seq.tracks()[0].is_finished());
    assert_eq!(ticks(&seq.tracks()[1]), vec![0, 0, 96, 96]);
}

#[test]
fn recover_without_header() {
    let raw = chunk(b"MTrk", SIMPLE_TRACK);
    let mut builder = SequenceBuilder::new();
    let report = Reader::new()
        .recover(true)
        .read(&raw, &mut builder)
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    let seq = builder.finish();
    assert_eq!(seq.format(), Format::SingleTrack);
    assert_eq!(ticks(&seq.tracks()[0]), vec![0, 0, 96, 96]);
}

#[test]
fn rich_file_contents() {
    let seq = Sequence::parse(&rich_file()).unwrap();
    assert_eq!(seq.format(), Format::Parallel);
    assert_eq!(seq.timing(), Timing::Metrical(u15::new(480)));
    assert_eq!(seq.name(), Some(&b"Song"[..]));
    assert_eq!(seq.tracks()[1].name(), Some(&b"Lead"[..]));

    let metas = seq
        .events_of(Category::Meta)
        .map(|ev| ev.kind.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        metas,
        vec![
            EventKind::Meta(MetaMessage::TrackName(b"Song".to_vec())),
            EventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
            EventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
            EventKind::Meta(MetaMessage::KeySignature(-2, true)),
            EventKind::Meta(MetaMessage::SmpteOffset(
                SmpteTime::new(1, 0, 0, 0, 0, crate::Fps::Fps30).unwrap()
            )),
            EventKind::Meta(MetaMessage::Text(TextKind::Text, b"abc".to_vec())),
            EventKind::Meta(MetaMessage::Unknown(0x60, vec![0x07])),
            EventKind::Meta(MetaMessage::Unknown(0x51, vec![0x00, 0x07, 0xA1, 0x20])),
            EventKind::Meta(MetaMessage::TrackName(b"Lead".to_vec())),
        ]
    );

    let mode = seq.events_of(Category::ChannelMode).collect::<Vec<_>>();
    assert_eq!(mode.len(), 1);
    assert_eq!(mode[0].kind.data(), vec![0x7B, 0x00]);
    assert_eq!(mode[0].kind.channel(), Some(u4::new(0)));

    let lead = &seq.tracks()[1];
    assert_eq!(
        lead.events()[6].kind,
        EventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::PitchBend {
                bend: PitchBend::mid_raw_value()
            }
        }
    );
    assert_eq!(ticks(lead), vec![0, 0, 0, 0, 0, 96, 96, 96, 112, 112, 112, 240]);
    assert_eq!(seq.tracks()[0].end_ticks(), 480);
}

#[test]
fn name_dispatch_depends_on_track() {
    #[derive(Default)]
    struct Names {
        sequence: Vec<Vec<u8>>,
        tracks: Vec<Vec<u8>>,
    }
    impl Handler for Names {
        fn sequence_name(&mut self, _delta: u28, name: &[u8]) {
            self.sequence.push(name.to_vec());
        }

        fn track_name(&mut self, _delta: u28, name: &[u8]) {
            self.tracks.push(name.to_vec());
        }
    }
    let mut names = Names::default();
    crate::read(&rich_file(), &mut names).unwrap();
    assert_eq!(names.sequence, vec![b"Song".to_vec()]);
    assert_eq!(names.tracks, vec![b"Lead".to_vec()]);
}

#[test]
fn round_trip() {
    let raw = rich_file();
    let seq = Sequence::parse(&raw).unwrap();
    let written = seq.to_bytes().unwrap();
    let reparsed = Sequence::parse(&written).unwrap();
    assert_eq!(seq, reparsed);

    let flatten = |seq: &Sequence| {
        seq.tracks()
            .iter()
            .flat_map(|track| track.iter())
            .map(|ev| {
                (
                    ev.kind.category(),
                    ev.kind.channel(),
                    ev.kind.data(),
                    ev.ticks(),
                    ev.track(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(flatten(&seq), flatten(&reparsed));

    //Writing is deterministic
    assert_eq!(reparsed.to_bytes().unwrap(), written);
}

#[test]
fn writer_uses_running_status() {
    let raw = smf(
        0,
        96,
        &[&[
            0x00, 0x90, 0x40, 0x40, 0x60, 0x90, 0x40, 0x00, 0x00, 0xFF, 0x01, 0x00, 0x00, 0x90,
            0x41, 0x40, 0x00, 0xFF, 0x2F, 0x00,
        ]],
    );
    let mut writer = Writer::new(Vec::new());
    crate::read(&raw, &mut writer).unwrap();
    let written = writer.finish().unwrap();
    assert_eq!(
        &written[22..],
        &[
            0x00, 0x90, 0x40, 0x40, 0x60, 0x40, 0x00, 0x00, 0xFF, 0x01, 0x00, 0x00, 0x90, 0x41,
            0x40, 0x00, 0xFF, 0x2F, 0x00,
        ][..]
    );
    assert_eq!(&written[18..22], &[0, 0, 0, 19]);
}

#[test]
fn writer_patches_track_count() {
    let mut writer = Writer::new(Vec::new());
    writer.header(Format::Parallel, 3, Timing::Metrical(u15::new(96)));
    writer.start_of_track(0);
    writer.note_on(u28::new(0), u4::new(1), u7::new(60), u7::new(100));
    //No explicit end of track event: one is added
    writer.end_of_track(u28::new(10));
    writer.eof();
    let written = writer.finish().unwrap();
    assert_eq!(&written[10..12], &[0, 1]);
    let seq = Sequence::parse(&written).unwrap();
    assert_eq!(ticks(&seq.tracks()[0]), vec![0, 0, 10]);
}

#[test]
fn writer_misuse() {
    let mut writer = Writer::new(Vec::new());
    writer.note_on(u28::new(0), u4::new(0), u7::new(60), u7::new(100));
    writer.header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96)));
    writer.eof();
    let err = writer.finish().unwrap_err();
    assert_eq!(err.kind().message(), Some("event outside of a track"));

    let mut writer = Writer::new(Vec::new());
    writer.eof();
    let err = writer.finish().unwrap_err();
    assert_eq!(err.kind().message(), Some("end of file without a header"));

    let mut writer = Writer::new(Vec::new());
    writer.header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96)));
    writer.start_of_track(0);
    writer.end_of_track(u28::new(0));
    let err = writer.finish().unwrap_err();
    assert_eq!(
        err.kind().message(),
        Some("writer finished before the end of the file")
    );

    let mut writer = Writer::new(Vec::new());
    writer.header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96)));
    writer.start_of_track(0);
    writer.start_of_track(1);
    writer.eof();
    assert!(writer.finish().is_err());
}

#[test]
fn writer_reports_sink_errors() {
    #[derive(Debug)]
    struct Broken;
    impl io::Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    let seq = Sequence::parse(&smf(0, 96, &[SIMPLE_TRACK])).unwrap();
    let err = seq.write(Broken).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Io(_)));
}

#[test]
fn transpose_while_copying() {
    struct Transpose<H> {
        inner: H,
        by: u8,
    }
    impl<H: Handler> Handler for Transpose<H> {
        fn header(&mut self, format: Format, track_count: u16, timing: Timing) {
            self.inner.header(format, track_count, timing)
        }

        fn start_of_track(&mut self, track: usize) {
            self.inner.start_of_track(track)
        }

        fn end_of_track(&mut self, delta: u28) {
            self.inner.end_of_track(delta)
        }

        fn eof(&mut self) {
            self.inner.eof()
        }

        fn note_on(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {
            let key = u7::new(key.as_int() + self.by);
            self.inner.note_on(delta, channel, key, vel)
        }

        fn note_off(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {
            let key = u7::new(key.as_int() + self.by);
            self.inner.note_off(delta, channel, key, vel)
        }
    }
    let mut transpose = Transpose {
        inner: Writer::new(Vec::new()),
        by: 12,
    };
    crate::read(&smf(0, 96, &[SIMPLE_TRACK]), &mut transpose).unwrap();
    let written = transpose.inner.finish().unwrap();
    let seq = Sequence::parse(&written).unwrap();
    let events = seq.tracks()[0].events();
    assert_eq!(events[1].kind, note_on(0, 0x4C, 0x40));
    assert_eq!(events[2].kind, note_off(0, 0x4C, 0x40));
    assert_eq!(ticks(&seq.tracks()[0]), vec![0, 0, 96, 96]);
}

#[test]
fn rmid_container() {
    let raw = rich_file();
    let mut data = b"data".to_vec();
    data.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    data.extend_from_slice(&raw);
    if raw.len() % 2 == 1 {
        data.push(0);
    }
    let mut riff = b"RIFF".to_vec();
    riff.extend_from_slice(&((4 + data.len()) as u32).to_le_bytes());
    riff.extend_from_slice(b"RMID");
    riff.extend_from_slice(&data);
    assert_eq!(
        Sequence::parse(&riff).unwrap(),
        Sequence::parse(&raw).unwrap()
    );
}

/// Two tracks with events at ticks 0, 10, 20 and 0, 10, 15.
fn two_tracks() -> Sequence {
    let mut a = Track::new(0);
    for (delta, key) in [(0, 1), (10, 2), (10, 3)] {
        a.push(u28::new(delta), note_on(0, key, 64)).unwrap();
    }
    a.push(u28::new(0), EventKind::EndOfTrack).unwrap();
    let mut b = Track::new(1);
    for (delta, key) in [(0, 11), (10, 12), (5, 13)] {
        b.push(u28::new(delta), note_on(1, key, 64)).unwrap();
    }
    b.push(u28::new(15), EventKind::EndOfTrack).unwrap();
    Sequence::new(Format::Parallel, Timing::Metrical(u15::new(96)), vec![a, b]).unwrap()
}

#[test]
fn merge_order() {
    let seq = two_tracks();
    let order = seq
        .merged()
        .map(|ev| (ev.ticks(), ev.track()))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        vec![
            (0, 0),
            (0, 0),
            (0, 1),
            (0, 1),
            (10, 0),
            (10, 1),
            (15, 1),
            (20, 0),
            (20, 0),
            (30, 1),
        ]
    );
    //Restartable, and exact about its length
    let merged = seq.merged();
    assert_eq!(merged.size_hint(), (10, Some(10)));
    assert_eq!(merged.clone().count(), 10);
    assert_eq!(seq.merged().collect::<Vec<_>>(), merged.collect::<Vec<_>>());
}

#[test]
fn single_track_conversion() {
    let seq = two_tracks().to_single_track().unwrap();
    assert_eq!(seq.format(), Format::SingleTrack);
    assert_eq!(seq.tracks().len(), 1);
    let track = &seq.tracks()[0];
    let keys = track
        .iter()
        .filter_map(|ev| match ev.kind {
            EventKind::Midi {
                message: MidiMessage::NoteOn { key, .. },
                ..
            } => Some(key.as_int()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(keys, vec![1, 11, 2, 12, 13, 3]);
    assert_eq!(ticks(track), vec![0, 0, 0, 10, 10, 15, 20, 30]);
    assert_eq!(
        track
            .iter()
            .filter(|ev| ev.kind == EventKind::EndOfTrack)
            .count(),
        1
    );
    //Survives a trip through a file
    assert_eq!(Sequence::parse(&seq.to_bytes().unwrap()).unwrap(), seq);
}

#[test]
fn sequence_invariants() {
    let mut track = Track::new(0);
    assert!(!track.is_empty());
    assert_eq!(track.len(), 1);
    track.push(u28::new(0), note_on(0, 60, 64)).unwrap();
    assert!(Sequence::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(96)),
        vec![track.clone()]
    )
    .is_err());
    track.push(u28::new(0), EventKind::EndOfTrack).unwrap();
    assert!(track.push(u28::new(0), note_on(0, 60, 0)).is_err());
    assert!(Sequence::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(96)),
        vec![track.clone(), track.clone()]
    )
    .is_err());
    let seq = Sequence::new(
        Format::Sequential,
        Timing::Metrical(u15::new(96)),
        vec![track.clone(), track],
    )
    .unwrap();
    //Renumbered by position
    assert!(seq.tracks()[1].iter().all(|ev| ev.track() == 1));
}

#[test]
fn replay_drives_any_handler() {
    let raw = rich_file();
    let seq = Sequence::parse(&raw).unwrap();
    let (_, from_file) = record(Reader::new(), &raw);
    let mut rec = Recorder::default();
    seq.replay(&mut rec);
    assert_eq!(rec.calls, from_file);
}
