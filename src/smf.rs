//! Specific to the SMF packaging of MIDI streams.
//!
//! Walks the chunks of a file and feeds the decoded events to a [`Handler`].

use crate::{
    event::{EventKind, MetaMessage, RawEvent},
    handler::Handler,
    prelude::*,
    primitive::{Format, Timing},
    riff,
};

/// Read a Standard Midi File with the default options, dispatching its events to `handler`.
///
/// Shorthand for `Reader::new().read(raw, handler)`.
pub fn read<H: Handler + ?Sized>(raw: &[u8], handler: &mut H) -> Result<ReadReport> {
    Reader::new().read(raw, handler)
}

/// Options for reading a Standard Midi File.
///
/// ```rust
/// use smfkit::{Ignore, Reader};
///
/// let bytes = [0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 1, 0, 0, 0, 96];
/// let report = Reader::new().strict(false).read(&bytes, &mut Ignore).unwrap();
/// assert_eq!(report.tracks, 0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reader {
    strict: bool,
    recover: bool,
}
impl Default for Reader {
    fn default() -> Reader {
        Reader {
            strict: cfg!(feature = "strict"),
            recover: false,
        }
    }
}
impl Reader {
    /// The default options: lenient unless the `strict` feature is enabled, and without
    /// recovery.
    #[inline]
    pub fn new() -> Reader {
        Reader::default()
    }

    /// In strict mode every irregularity is an error, including those that could otherwise be
    /// read unambiguously and are only logged as warnings.
    #[inline]
    pub fn strict(mut self, strict: bool) -> Reader {
        self.strict = strict;
        self
    }

    /// In recovery mode an error inside a track does not stop the read.
    ///
    /// The rest of the failing track is skipped, the handler receives `end_of_track`, the error
    /// is stored in the returned [`ReadReport`], and reading goes on with the next chunk.
    /// A missing or damaged header is tolerated too.
    #[inline]
    pub fn recover(mut self, recover: bool) -> Reader {
        self.recover = recover;
        self
    }

    /// Read a whole file, calling `handler` for every event in file order.
    ///
    /// Byte offsets in errors are counted from the start of the SMF data, which is the start of
    /// `raw` unless the file is wrapped in a RIFF container.
    pub fn read<H: Handler + ?Sized>(&self, raw: &[u8], handler: &mut H) -> Result<ReadReport> {
        let raw = match riff::unwrap(raw) {
            Ok(smf) => {
                debug!("unwrapped {} bytes of smf data from a riff container", smf.len());
                smf
            }
            Err(_) => raw,
        };
        let mut report = ReadReport::default();
        let mut chunks = ChunkIter::new(raw);

        //Header phase
        let mut declared_tracks = None;
        let mut first_track = None;
        match chunks.next() {
            Some(Ok(chunk)) if chunk.id == *b"MThd" => {
                match self.read_header(&chunk, &mut report.warnings) {
                    Ok((format, track_count, timing)) => {
                        declared_tracks = Some(track_count);
                        handler.header(format, track_count, timing);
                    }
                    Err(err) => self.recoverable(err.at(chunk.offset), &mut report)?,
                }
            }
            Some(Ok(chunk)) => {
                let err = err_invalid!("expected header chunk").at(chunk.offset);
                self.recoverable(err, &mut report)?;
                first_track = Some(chunk);
            }
            Some(Err(err)) => self.recoverable(err, &mut report)?,
            None => bail!(err_invalid!("no header chunk")),
        }

        //Track phase
        for chunk in first_track.map(Ok).into_iter().chain(&mut chunks) {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    //Chunk headers can't be trusted after this point, so stop reading
                    self.tolerate(err, &mut report.warnings)?;
                    break;
                }
            };
            match &chunk.id {
                b"MTrk" => {
                    let track = report.tracks;
                    if declared_tracks.map_or(false, |declared| track == declared as usize) {
                        let err = err_malformed!("file has more tracks than declared");
                        self.tolerate(err.at(chunk.offset), &mut report.warnings)?;
                    }
                    trace!("track {} starts at offset {:#x}", track, chunk.offset);
                    handler.start_of_track(track);
                    if let Err(err) = self.read_track(&chunk, track, handler, &mut report.warnings)
                    {
                        let err = err.in_track(track);
                        if !self.recover {
                            return Err(err);
                        }
                        warn!("skipping rest of track: {}", err);
                        handler.end_of_track(u28::new(0));
                        report.skipped.push(err);
                    }
                    report.tracks += 1;
                }
                b"MThd" => {
                    let err = err_malformed!("found duplicate header").at(chunk.offset);
                    self.tolerate(err, &mut report.warnings)?;
                }
                id => {
                    debug!(
                        "skipping unknown chunk {:?} ({} bytes)",
                        String::from_utf8_lossy(id),
                        chunk.declared
                    );
                    if chunk.body.len() < chunk.declared {
                        let err = err_malformed!("chunk runs past the end of the file");
                        self.tolerate(err.at(chunk.offset), &mut report.warnings)?;
                    }
                }
            }
        }
        if let Some(declared) = declared_tracks {
            if report.tracks < declared as usize {
                debug!(
                    "file declares {} tracks, but only {} were found",
                    declared, report.tracks
                );
                let err = err_malformed!("file has less tracks than declared");
                self.tolerate(err, &mut report.warnings)?;
            }
        }
        handler.eof();
        Ok(report)
    }

    /// Keep an error around in recovery mode, or bubble it up otherwise.
    fn recoverable(&self, err: Error, report: &mut ReadReport) -> Result<()> {
        if !self.recover {
            return Err(err);
        }
        warn!("recovering from damaged header: {}", err);
        report.skipped.push(err);
        Ok(())
    }

    /// Fail in strict mode, otherwise log the irregularity and keep it as a warning.
    fn tolerate(&self, err: Error, warnings: &mut Vec<Error>) -> Result<()> {
        ensure!(!self.strict, err);
        warn!("{}", err);
        warnings.push(err);
        Ok(())
    }

    /// Read both the header and the track count.
    fn read_header(
        &self,
        chunk: &Chunk,
        warnings: &mut Vec<Error>,
    ) -> Result<(Format, u16, Timing)> {
        ensure!(
            chunk.body.len() >= 6 && chunk.declared >= 6,
            err_invalid!("header chunk is too short")
        );
        let mut raw = chunk.body;
        let format = Format::read(&mut raw)?;
        let track_count = u16::read(&mut raw)?;
        let timing = Timing::read(&mut raw)?;
        if chunk.declared != 6 {
            debug!("header chunk is {} bytes long", chunk.declared);
            let err = err_malformed!("non-standard header chunk length");
            self.tolerate(err.at(chunk.offset), warnings)?;
        }
        if format == Format::SingleTrack && track_count != 1 {
            debug!("singletrack format file declares {} tracks", track_count);
            let err = err_invalid!("singletrack format file declares several tracks");
            self.tolerate(err.at(chunk.offset), warnings)?;
        }
        debug!(
            "header: format {:?}, {} tracks, timing {:?}",
            format, track_count, timing
        );
        Ok((format, track_count, timing))
    }

    /// Parse the events of a single track chunk.
    ///
    /// Only calls `end_of_track` if the whole track was read successfully.
    fn read_track<H: Handler + ?Sized>(
        &self,
        chunk: &Chunk,
        track: usize,
        handler: &mut H,
        warnings: &mut Vec<Error>,
    ) -> Result<()> {
        let mut state = TrackState::new(track, chunk.body_offset);
        let limit = chunk.body.len();
        let truncated = || {
            Error::new(ErrorKind::ChunkLengthMismatch {
                declared: chunk.declared,
                consumed: chunk.body.len(),
            })
            .at(chunk.body_offset + limit)
        };
        let mut pos = 0;
        let mut eot = None;
        while pos < limit {
            let offset = chunk.body_offset + pos;
            state.offset = offset;
            let (delta, event, len) =
                read_event(&chunk.window[pos..], limit - pos, &mut state.running_status)
                    .map_err(|err| {
                        if limit < chunk.declared {
                            truncated()
                        } else {
                            err.at(offset)
                        }
                    })?;
            ensure!(
                pos + len <= limit,
                Error::new(ErrorKind::ChunkLengthMismatch {
                    declared: chunk.declared,
                    consumed: pos + len,
                })
                .at(offset)
            );
            pos += len;
            if let Some(delta) = self
                .process_event(delta, event, &mut state, handler, warnings)
                .map_err(|err| err.at(offset))?
            {
                eot = Some(delta);
                break;
            }
        }
        state.offset = chunk.body_offset + pos;
        self.flush_sysex(&mut state, handler, warnings)?;
        ensure!(limit == chunk.declared, truncated());
        let delta = match eot {
            Some(delta) => {
                if pos < limit {
                    debug!("{} bytes after the end of track {}", limit - pos, track);
                    let err = err_malformed!("found bytes after the end of track");
                    self.tolerate(err.in_track(track).at(state.offset), warnings)?;
                }
                delta
            }
            None => {
                let err = err_malformed!("track has no end of track event");
                self.tolerate(err.in_track(track).at(state.offset), warnings)?;
                state.take_delta(u28::new(0))?
            }
        };
        trace!("track {} ends at tick {}", track, state.ticks);
        handler.end_of_track(delta);
        Ok(())
    }

    /// Feed a single decoded event through the track state into the handler.
    ///
    /// Returns the delta time of the end of track event, if this was it.
    fn process_event<H: Handler + ?Sized>(
        &self,
        delta: u28,
        event: RawEvent,
        state: &mut TrackState,
        handler: &mut H,
        warnings: &mut Vec<Error>,
    ) -> Result<Option<u28>> {
        state.ticks += delta.as_int() as u64;
        if let RawEvent::Escape(data) = event {
            if state.sysex.is_some() {
                //Continuation packet of a split sysex message
                let delta = state.take_delta(delta)?;
                if let Some(sysex) = state.sysex.as_mut() {
                    sysex.delta = sum_delta(sysex.delta, delta)?;
                    sysex.data.extend_from_slice(data);
                }
                if data.last() == Some(&0xF7) {
                    if let Some(sysex) = state.sysex.take() {
                        handler.sysex(sysex.delta, &sysex.data);
                    }
                }
                return Ok(None);
            }
        }
        if let RawEvent::System { status, data } = event {
            trace!("system message {:#x} in track {}", status, state.track);
            let err = err_malformed!("system message inside a track");
            self.tolerate(err.in_track(state.track).at(state.offset), warnings)?;
            handler.invalid_event(delta, status, data);
            state.carried_delta = sum_delta(state.carried_delta, delta)?;
            return Ok(None);
        }
        //Any other event ends a pending sysex message
        self.flush_sysex(state, handler, warnings)?;
        let delta = state.take_delta(delta)?;
        let kind = match event {
            RawEvent::Midi { channel, message } => EventKind::Midi { channel, message },
            RawEvent::Meta {
                type_byte: 0x2F, ..
            } => return Ok(Some(delta)),
            RawEvent::Meta { type_byte, data } => {
                EventKind::Meta(MetaMessage::read(type_byte, data))
            }
            RawEvent::SysEx(data) => {
                if data.last() != Some(&0xF7) {
                    //Wait for continuation packets
                    state.sysex = Some(PendingSysEx {
                        delta,
                        data: data.to_vec(),
                    });
                    return Ok(None);
                }
                EventKind::SysEx(data.to_vec())
            }
            RawEvent::Escape(data) => EventKind::Escape(data.to_vec()),
            RawEvent::System { .. } => return Ok(None),
        };
        kind.dispatch(delta, state.track, handler);
        Ok(None)
    }

    /// Deliver a sysex message that never got its terminating `0xF7`.
    fn flush_sysex<H: Handler + ?Sized>(
        &self,
        state: &mut TrackState,
        handler: &mut H,
        warnings: &mut Vec<Error>,
    ) -> Result<()> {
        if let Some(sysex) = state.sysex.take() {
            handler.sysex(sysex.delta, &sysex.data);
            let err = Error::new(ErrorKind::UnterminatedSysEx {
                len: sysex.data.len(),
            });
            self.tolerate(err.in_track(state.track).at(state.offset), warnings)?;
        }
        Ok(())
    }
}

/// What happened during a successful read.
#[derive(Debug, Default)]
pub struct ReadReport {
    /// How many track chunks were found.
    pub tracks: usize,
    /// Errors that were skipped over in recovery mode, in the order they happened.
    pub skipped: Vec<Error>,
    /// Irregularities that were read past outside of strict mode, in the order they happened.
    ///
    /// These are the errors a strict read would have failed with.
    pub warnings: Vec<Error>,
}

/// Decode the delta time and event at the start of `raw`.
///
/// The event is first decoded from the `limit` bytes that are left in the chunk. If it does not
/// fit, it is decoded again from the rest of the file in order to tell how many bytes it would
/// need, so that a wrong chunk length can be told apart from a corrupted event.
fn read_event<'a>(
    raw: &'a [u8],
    limit: usize,
    running_status: &mut Option<u8>,
) -> Result<(u28, RawEvent<'a>, usize)> {
    let mut status = *running_status;
    match read_one(&raw[..limit], &mut status) {
        Ok(event) => {
            *running_status = status;
            Ok(event)
        }
        Err(err) => match read_one(raw, running_status) {
            Ok(event) if event.2 > limit => Ok(event),
            _ => Err(err),
        },
    }
}

fn read_one<'a>(
    mut raw: &'a [u8],
    running_status: &mut Option<u8>,
) -> Result<(u28, RawEvent<'a>, usize)> {
    let start = raw.len();
    let delta = u28::read_varlen(&mut raw)?;
    let event = RawEvent::read(&mut raw, running_status)?;
    Ok((delta, event, start - raw.len()))
}

fn sum_delta(a: u28, b: u28) -> Result<u28> {
    u28::try_from(a.as_int() + b.as_int())
        .ok_or_else(|| err_malformed!("delta time overflow"))
}

/// Parsing state that lives as long as a single track.
struct TrackState {
    track: usize,
    running_status: Option<u8>,
    /// Absolute time of the last event read.
    ticks: u64,
    /// Offset of the event being processed.
    offset: usize,
    /// Delta time of skipped events, to be added to the next delivered event.
    carried_delta: u28,
    sysex: Option<PendingSysEx>,
}
impl TrackState {
    fn new(track: usize, offset: usize) -> TrackState {
        TrackState {
            track,
            running_status: None,
            ticks: 0,
            offset,
            carried_delta: u28::new(0),
            sysex: None,
        }
    }

    /// The delta time of the next delivered event.
    fn take_delta(&mut self, delta: u28) -> Result<u28> {
        let carried = mem::take(&mut self.carried_delta);
        sum_delta(carried, delta)
    }
}

/// A sysex message whose last packet did not end in `0xF7` yet.
struct PendingSysEx {
    /// Sum of the delta times of all packets so far.
    delta: u28,
    data: Vec<u8>,
}

/// A chunk header along with a view into the rest of the file.
#[derive(Copy, Clone, Debug)]
struct Chunk<'a> {
    id: [u8; 4],
    /// Offset of the chunk header.
    offset: usize,
    /// Offset of the chunk body.
    body_offset: usize,
    /// Length from the chunk header.
    declared: usize,
    /// The chunk body, which might be shorter than `declared` if the file is truncated.
    body: &'a [u8],
    /// Everything from the start of the body until EOF.
    window: &'a [u8],
}

#[derive(Copy, Clone, Debug)]
struct ChunkIter<'a> {
    /// The whole file.
    file: &'a [u8],
    /// Offset of the next chunk.
    pos: usize,
}
impl<'a> ChunkIter<'a> {
    fn new(file: &'a [u8]) -> ChunkIter<'a> {
        ChunkIter { file, pos: 0 }
    }

    /// If we're *exactly* at EOF, returns a None signalling no more chunks.
    fn read(&mut self) -> Result<Option<Chunk<'a>>> {
        let offset = self.pos;
        let mut raw = &self.file[offset..];
        if raw.is_empty() {
            return Ok(None);
        }
        let mut id = [0; 4];
        id.copy_from_slice(
            raw.split_checked(4)
                .ok_or_else(|| err_invalid!("failed to read chunk id").at(offset))?,
        );
        let declared = u32::read(&mut raw)
            .map_err(|_| err_invalid!("failed to read chunk length").at(offset))?
            as usize;
        let window = raw;
        let body = match raw.split_checked(declared) {
            Some(body) => body,
            None => {
                trace!(
                    "chunk at offset {:#x} declares {} bytes, but only {} are left",
                    offset,
                    declared,
                    window.len()
                );
                window
            }
        };
        self.pos = offset + 8 + body.len();
        Ok(Some(Chunk {
            id,
            offset,
            body_offset: offset + 8,
            declared,
            body,
            window,
        }))
    }
}
impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;
    fn next(&mut self) -> Option<Result<Chunk<'a>>> {
        //Flip around option and result
        match self.read() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                //Ensure `read` isn't called again, by setting the read pointer to EOF
                self.pos = self.file.len();
                Some(Err(err))
            }
        }
    }
}
