//! In-memory representation of a whole file.

use crate::{
    event::{Category, Event, EventKind, MetaMessage, MidiMessage, PitchBend, TextKind},
    handler::Handler,
    prelude::*,
    primitive::{Format, SmpteTime, Timing},
    smf,
    writer::Writer,
};
use std::{cmp::Reverse, collections::BinaryHeap};

/// A single track: an ordered list of events.
///
/// Every track starts with a [`EventKind::StartOfTrack`] marker at tick 0, and a finished track
/// ends with exactly one [`EventKind::EndOfTrack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    index: usize,
    events: Vec<Event>,
}
impl Track {
    /// Create an empty track, containing only the start marker.
    pub fn new(index: usize) -> Track {
        Track {
            index,
            events: vec![Event::new(u28::new(0), 0, index, EventKind::StartOfTrack)],
        }
    }

    /// Append an event `delta` ticks after the last one.
    ///
    /// Fails if the track already ended, or if `kind` is a start of track marker.
    pub fn push(&mut self, delta: u28, kind: EventKind) -> Result<()> {
        ensure!(
            kind != EventKind::StartOfTrack,
            err_invalid!("start of track marker in the middle of a track")
        );
        ensure!(!self.is_finished(), err_invalid!("event after end of track"));
        let ticks = self.end_ticks() + delta.as_int() as u64;
        self.events.push(Event::new(delta, ticks, self.index, kind));
        Ok(())
    }

    /// The position of this track in its sequence.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Amount of events, including the start and end markers.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always `false`, since there is at least the start marker.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Absolute time of the last event.
    pub fn end_ticks(&self) -> u64 {
        self.events.last().map(Event::ticks).unwrap_or(0)
    }

    /// Whether the last event is an end of track.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.events.last().map(|ev| &ev.kind),
            Some(EventKind::EndOfTrack)
        )
    }

    /// The first name meta event of the track.
    pub fn name(&self) -> Option<&[u8]> {
        self.events.iter().find_map(|ev| match &ev.kind {
            EventKind::Meta(MetaMessage::TrackName(name)) => Some(&name[..]),
            _ => None,
        })
    }

    fn reindex(&mut self, index: usize) {
        if self.index != index {
            self.index = index;
            for ev in self.events.iter_mut() {
                ev.set_track(index);
            }
        }
    }
}
impl<'a> IntoIterator for &'a Track {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;
    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// A whole Standard Midi File in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence {
    format: Format,
    timing: Timing,
    tracks: Vec<Track>,
}
impl Sequence {
    /// Build a sequence out of finished tracks.
    ///
    /// The tracks are renumbered by position. Fails if a track is not finished, or if a single
    /// track format is requested with a track count other than one.
    pub fn new(format: Format, timing: Timing, mut tracks: Vec<Track>) -> Result<Sequence> {
        ensure!(
            format != Format::SingleTrack || tracks.len() == 1,
            err_invalid!("singletrack format requires exactly one track")
        );
        ensure!(
            tracks.iter().all(Track::is_finished),
            err_invalid!("track does not end with an end of track event")
        );
        for (i, track) in tracks.iter_mut().enumerate() {
            track.reindex(i);
        }
        Ok(Sequence {
            format,
            timing,
            tracks,
        })
    }

    /// Parse a whole file in memory, with the default [`Reader`](crate::Reader) options.
    pub fn parse(raw: &[u8]) -> Result<Sequence> {
        let mut builder = SequenceBuilder::new();
        smf::read(raw, &mut builder)?;
        Ok(builder.finish())
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn timing(&self) -> Timing {
        self.timing
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// The name of the sequence, from the name meta event of the first track.
    pub fn name(&self) -> Option<&[u8]> {
        self.tracks.first().and_then(Track::name)
    }

    /// All events of a given category, track after track.
    pub fn events_of(&self, category: Category) -> impl Iterator<Item = &Event> {
        self.tracks
            .iter()
            .flat_map(|track| track.iter())
            .filter(move |ev| ev.kind.category() == category)
    }

    /// Iterate over the events of all tracks at once, ordered by absolute time.
    ///
    /// Events at the same tick come in track order, and keep their order within a track.
    /// The iterator is lazy; call `merged` again (or clone it) to start over.
    pub fn merged(&self) -> Merged<'_> {
        Merged::new(&self.tracks)
    }

    /// Feed the whole sequence into a handler, as if it were read from a file.
    pub fn replay<H: Handler + ?Sized>(&self, handler: &mut H) {
        let track_count = u16::try_from(self.tracks.len()).unwrap_or(u16::MAX);
        handler.header(self.format, track_count, self.timing);
        for track in self.tracks.iter() {
            for ev in track.iter() {
                ev.kind.dispatch(ev.delta(), track.index, handler);
            }
        }
        handler.eof();
    }

    /// Encode the sequence as a Standard Midi File into the given sink, giving it back once done.
    pub fn write<W: io::Write>(&self, sink: W) -> Result<W> {
        let mut writer = Writer::new(sink);
        self.replay(&mut writer);
        writer.finish()
    }

    /// Encode the sequence as a Standard Midi File in memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write(Vec::new())
    }

    /// Merge all tracks into a single one, in a single track format sequence.
    ///
    /// Start and end markers of the original tracks are dropped, and a single end of track is
    /// placed at the time the last track ended.
    pub fn to_single_track(&self) -> Result<Sequence> {
        let end = self.tracks.iter().map(Track::end_ticks).max().unwrap_or(0);
        let mut track = Track::new(0);
        for ev in self.merged() {
            match ev.kind {
                EventKind::StartOfTrack | EventKind::EndOfTrack => {}
                _ => {
                    let delta = delta_between(track.end_ticks(), ev.ticks())?;
                    track.push(delta, ev.kind.clone())?;
                }
            }
        }
        let delta = delta_between(track.end_ticks(), end)?;
        track.push(delta, EventKind::EndOfTrack)?;
        Sequence::new(Format::SingleTrack, self.timing, vec![track])
    }
}

fn delta_between(from: u64, to: u64) -> Result<u28> {
    u32::try_from(to - from)
        .ok()
        .and_then(u28::try_from)
        .ok_or_else(|| err_malformed!("delta time does not fit in a varlen integer"))
}

/// A lazy merge of several tracks, ordered by `(ticks, track)`.
///
/// Created by [`Sequence::merged`].
#[derive(Clone, Debug)]
pub struct Merged<'a> {
    tracks: &'a [Track],
    /// Index of the next event of every track.
    cursors: Vec<usize>,
    /// Holds the next pending event of every track that is not exhausted.
    heap: BinaryHeap<Reverse<(u64, usize)>>,
}
impl<'a> Merged<'a> {
    fn new(tracks: &'a [Track]) -> Merged<'a> {
        let heap = tracks
            .iter()
            .enumerate()
            .filter_map(|(i, track)| track.events.first().map(|ev| Reverse((ev.ticks(), i))))
            .collect();
        Merged {
            tracks,
            cursors: vec![0; tracks.len()],
            heap,
        }
    }
}
impl<'a> Iterator for Merged<'a> {
    type Item = &'a Event;
    fn next(&mut self) -> Option<&'a Event> {
        let Reverse((_, track)) = self.heap.pop()?;
        let events = &self.tracks[track].events;
        let ev = &events[self.cursors[track]];
        self.cursors[track] += 1;
        if let Some(next) = events.get(self.cursors[track]) {
            self.heap.push(Reverse((next.ticks(), track)));
        }
        Some(ev)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self
            .tracks
            .iter()
            .zip(self.cursors.iter())
            .map(|(track, &cursor)| track.events.len() - cursor)
            .sum();
        (left, Some(left))
    }
}

/// A [`Handler`] that collects every event into a [`Sequence`].
///
/// ```rust
/// use smfkit::{read, SequenceBuilder};
///
/// # let bytes = [0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 1, 0, 0, 0, 96];
/// let mut builder = SequenceBuilder::new();
/// read(&bytes, &mut builder).unwrap();
/// let seq = builder.finish();
/// assert_eq!(seq.tracks().len(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SequenceBuilder {
    header: Option<(Format, Timing)>,
    tracks: Vec<Track>,
}
impl SequenceBuilder {
    pub fn new() -> SequenceBuilder {
        SequenceBuilder::default()
    }

    /// Get the sequence out of the builder.
    ///
    /// Without a header, the format is guessed from the amount of tracks and the timing defaults
    /// to 96 ticks per beat. A single track file with several tracks becomes a parallel one.
    pub fn finish(self) -> Sequence {
        let (format, timing) = self.header.unwrap_or_else(|| {
            let format = if self.tracks.len() == 1 {
                Format::SingleTrack
            } else {
                Format::Parallel
            };
            (format, Timing::Metrical(u15::new(96)))
        });
        let format = if format == Format::SingleTrack && self.tracks.len() != 1 {
            warn!(
                "storing singletrack file with {} tracks as a parallel file",
                self.tracks.len()
            );
            Format::Parallel
        } else {
            format
        };
        Sequence {
            format,
            timing,
            tracks: self.tracks,
        }
    }

    fn push(&mut self, delta: u28, kind: EventKind) {
        match self.tracks.last_mut() {
            Some(track) => {
                if let Err(err) = track.push(delta, kind) {
                    warn!("dropping event in track {}: {}", track.index, err);
                }
            }
            None => warn!("dropping event outside of a track"),
        }
    }
}
handler_via_push! {
    impl[] SequenceBuilder {
        fn header(&mut self, format: Format, _track_count: u16, timing: Timing) {
            self.header = Some((format, timing));
        }

        fn start_of_track(&mut self, _track: usize) {
            //Tracks are numbered by position, even if the reader skipped some
            let index = self.tracks.len();
            self.tracks.push(Track::new(index));
        }

        fn end_of_track(&mut self, delta: u28) {
            if let Some(track) = self.tracks.last_mut() {
                if track.is_finished() {
                    return;
                }
            }
            self.push(delta, EventKind::EndOfTrack);
        }
    }
}
