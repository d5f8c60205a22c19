//! Serialization of handler events back into a Standard Midi File.

use crate::{
    event::{EventKind, MetaMessage, MidiMessage, PitchBend, TextKind},
    prelude::*,
    primitive::{Format, SmpteTime, Timing},
};

/// A [`Handler`](crate::Handler) that encodes every event it receives as a Standard Midi File.
///
/// Track bodies are buffered so that chunk lengths can be written before them, and the whole
/// file is written to the sink on `eof`, with the header declaring the amount of tracks actually
/// written. Since handler methods can't fail, the first error is kept and reported by
/// [`Writer::finish`]; every event after it is ignored.
///
/// ```rust
/// use smfkit::{Format, Handler, Timing, Writer, num::{u15, u28}};
///
/// let mut writer = Writer::new(Vec::new());
/// writer.header(Format::SingleTrack, 1, Timing::Metrical(u15::new(96)));
/// writer.start_of_track(0);
/// writer.end_of_track(u28::new(0));
/// writer.eof();
/// let bytes = writer.finish().unwrap();
/// assert_eq!(&bytes[14..], b"MTrk\0\0\0\x04\x00\xFF\x2F\x00");
/// ```
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    sink: W,
    header: Option<(Format, u16, Timing)>,
    /// Finished track chunks, ready to be written.
    chunks: Vec<u8>,
    track_count: usize,
    track: Option<TrackBuffer>,
    error: Option<Error>,
    done: bool,
}

/// Encoding state of the track being written.
#[derive(Debug)]
struct TrackBuffer {
    index: usize,
    body: Vec<u8>,
    running_status: Option<u8>,
    ticks: u64,
    ended: bool,
}

impl<W: io::Write> Writer<W> {
    pub fn new(sink: W) -> Writer<W> {
        Writer {
            sink,
            header: None,
            chunks: Vec::new(),
            track_count: 0,
            track: None,
            error: None,
            done: false,
        }
    }

    /// Get the sink back, or the first error that happened.
    ///
    /// Fails if `eof` was never called, since nothing was written to the sink then.
    pub fn finish(self) -> Result<W> {
        if let Some(err) = self.error {
            return Err(err);
        }
        ensure!(
            self.done,
            err_malformed!("writer finished before the end of the file")
        );
        Ok(self.sink)
    }

    /// Keep the first error only.
    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            debug!("writer failed: {}", err);
            self.error = Some(err);
        }
    }

    fn push(&mut self, delta: u28, kind: EventKind) {
        if let Err(err) = self.try_push(delta, &kind) {
            self.fail(err);
        }
    }

    fn try_push(&mut self, delta: u28, kind: &EventKind) -> Result<()> {
        if self.error.is_some() {
            return Ok(());
        }
        let track = self
            .track
            .as_mut()
            .ok_or_else(|| err_malformed!("event outside of a track"))?;
        ensure!(!track.ended, err_malformed!("event after end of track"));
        delta.write_varlen(&mut track.body);
        kind.write(&mut track.running_status, &mut track.body)?;
        track.ticks += delta.as_int() as u64;
        if *kind == EventKind::EndOfTrack {
            track.ended = true;
        }
        Ok(())
    }

    fn try_header(&mut self, format: Format, track_count: u16, timing: Timing) -> Result<()> {
        ensure!(
            self.header.is_none(),
            err_malformed!("header written twice")
        );
        ensure!(
            self.track.is_none() && self.track_count == 0,
            err_malformed!("header written after tracks")
        );
        self.header = Some((format, track_count, timing));
        Ok(())
    }

    fn try_start_of_track(&mut self, index: usize) -> Result<()> {
        ensure!(
            self.track.is_none(),
            err_malformed!("track started before the previous one ended")
        );
        ensure!(!self.done, err_malformed!("track started after the end of the file"));
        trace!("writing track {}", index);
        self.track = Some(TrackBuffer {
            index,
            body: Vec::with_capacity(8 * 1024),
            running_status: None,
            ticks: 0,
            ended: false,
        });
        Ok(())
    }

    fn try_end_of_track(&mut self, delta: u28) -> Result<()> {
        if self.track.as_ref().map_or(false, |track| !track.ended) {
            self.try_push(delta, &EventKind::EndOfTrack)?;
        }
        let track = self
            .track
            .take()
            .ok_or_else(|| err_malformed!("end of track outside of a track"))?;
        let len = u32::try_from(track.body.len())
            .map_err(|_| err_malformed!("midi chunk size exceeds 32 bit range"))?;
        self.chunks.extend_from_slice(b"MTrk");
        self.chunks.extend_from_slice(&len.to_be_bytes());
        self.chunks.extend_from_slice(&track.body);
        self.track_count += 1;
        trace!(
            "track {} written: {} bytes, {} ticks",
            track.index,
            len,
            track.ticks
        );
        Ok(())
    }

    fn try_eof(&mut self) -> Result<()> {
        ensure!(!self.done, err_malformed!("end of file written twice"));
        ensure!(
            self.track.is_none(),
            err_malformed!("end of file inside a track")
        );
        let (format, declared, timing) = self
            .header
            .ok_or_else(|| err_malformed!("end of file without a header"))?;
        let track_count = u16::try_from(self.track_count)
            .map_err(|_| err_malformed!("track count exceeds 16 bit range"))?;
        if track_count != declared {
            warn!(
                "header declared {} tracks, writing {} instead",
                declared, track_count
            );
        }
        let mut header = [0; 4 + 4 + 6];
        header[0..4].copy_from_slice(b"MThd");
        header[4..8].copy_from_slice(&6u32.to_be_bytes());
        header[8..10].copy_from_slice(&format.encode());
        header[10..12].copy_from_slice(&track_count.to_be_bytes());
        header[12..14].copy_from_slice(&timing.encode());
        self.sink.write_all(&header)?;
        self.sink.write_all(&self.chunks)?;
        self.sink.flush()?;
        self.chunks = Vec::new();
        self.done = true;
        debug!("wrote smf file with {} tracks", track_count);
        Ok(())
    }

    /// Run a fallible structural step, unless an error already happened.
    fn step(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) {
        if self.error.is_none() {
            if let Err(err) = f(self) {
                self.fail(err);
            }
        }
    }
}
handler_via_push! {
    impl[W: io::Write] Writer<W> {
        fn header(&mut self, format: Format, track_count: u16, timing: Timing) {
            self.step(|w| w.try_header(format, track_count, timing))
        }

        fn start_of_track(&mut self, track: usize) {
            self.step(|w| w.try_start_of_track(track))
        }

        fn end_of_track(&mut self, delta: u28) {
            self.step(|w| w.try_end_of_track(delta))
        }

        fn eof(&mut self) {
            self.step(|w| w.try_eof())
        }
    }
}
