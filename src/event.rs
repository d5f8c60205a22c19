//! All sort of events, their wire representation and their dispatch to a [`Handler`].

use crate::{
    handler::Handler,
    prelude::*,
    primitive::{read_varlen_slice, write_varlen_slice, SmpteTime},
};

/// A single event of a track, together with its timing.
///
/// The delta time, absolute time and track index are fixed when the event is appended to a
/// [`Track`](crate::Track); only the event kind itself can be modified afterwards.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Event {
    delta: u28,
    ticks: u64,
    track: usize,
    /// The type of event along with event-specific data.
    pub kind: EventKind,
}
impl Event {
    pub(crate) fn new(delta: u28, ticks: u64, track: usize, kind: EventKind) -> Event {
        Event {
            delta,
            ticks,
            track,
            kind,
        }
    }

    pub(crate) fn set_track(&mut self, track: usize) {
        self.track = track;
    }

    /// How many MIDI ticks after the previous event of the same track this event fires.
    #[inline]
    pub fn delta(&self) -> u28 {
        self.delta
    }

    /// Ticks elapsed since the start of the track.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The index of the track this event belongs to.
    #[inline]
    pub fn track(&self) -> usize {
        self.track
    }
}

/// Broad categories of events.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Category {
    /// The structural marker at the start of every track.
    StartOfTrack,
    /// Musical channel messages (notes, pressure, program changes, pitch bend and controllers
    /// other than the channel mode ones).
    ChannelVoice,
    /// Control changes on controllers 120 to 127.
    ChannelMode,
    /// Meta events, except for the end of track.
    Meta,
    /// System exclusive messages.
    SysEx,
    /// Escape sequences carrying arbitrary bytes.
    Escape,
    /// The end of track meta event.
    EndOfTrack,
}

/// Represents the different kinds of SMF events and their associated data.
///
/// It notably does *not* include the timing of the event; the [`Event`] struct is responsible
/// for this.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum EventKind {
    /// Marks the start of a track. Carries no data and is never encoded.
    StartOfTrack,
    /// A message associated to a MIDI channel carrying musical data.
    Midi {
        /// The MIDI channel that this event is associated with.
        channel: u4,
        /// The MIDI message type and associated data.
        message: MidiMessage,
    },
    /// A meta-message, giving extra information for correct playback, like tempo, song name,
    /// lyrics, etc...
    Meta(MetaMessage),
    /// A complete System Exclusive message.
    ///
    /// The data bytes do not include the implicit `0xF0` prefix, but do include the trailing
    /// `0xF7` when the message is properly terminated. Messages split into several packets are
    /// stored already joined.
    SysEx(Vec<u8>),
    /// An escape sequence, intended to send arbitrary data to the MIDI synthesizer.
    Escape(Vec<u8>),
    /// The obligatory last event of every track.
    EndOfTrack,
}
impl EventKind {
    /// The broad category of this event.
    pub fn category(&self) -> Category {
        match self {
            EventKind::StartOfTrack => Category::StartOfTrack,
            EventKind::Midi { message, .. } => {
                if message.is_channel_mode() {
                    Category::ChannelMode
                } else {
                    Category::ChannelVoice
                }
            }
            EventKind::Meta(_) => Category::Meta,
            EventKind::SysEx(_) => Category::SysEx,
            EventKind::Escape(_) => Category::Escape,
            EventKind::EndOfTrack => Category::EndOfTrack,
        }
    }

    /// The MIDI channel of channel events.
    pub fn channel(&self) -> Option<u4> {
        match self {
            EventKind::Midi { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// The raw parameter bytes of this event: the data bytes of a channel message, or the
    /// payload of a meta, sysex or escape event.
    pub fn data(&self) -> Vec<u8> {
        match self {
            EventKind::StartOfTrack | EventKind::EndOfTrack => Vec::new(),
            EventKind::Midi { message, .. } => message.data().to_vec(),
            EventKind::Meta(meta) => meta.payload(),
            EventKind::SysEx(data) | EventKind::Escape(data) => data.clone(),
        }
    }

    /// Writes a single event (without its delta time) to the given buffer.
    ///
    /// `running_status` keeps track of the last MIDI status, in order to make proper use of
    /// running status. It should be shared between consecutive calls of the same track, and
    /// should initially be set to `None`.
    pub(crate) fn write(&self, running_status: &mut Option<u8>, out: &mut Vec<u8>) -> Result<()> {
        //Running Status rules when writing:
        // - MIDI Messages (0x80 ..= 0xEF) alter and use running status
        // - System Exclusive (0xF0), Escape (0xF7) and Meta Messages (0xFF) cancel it
        match self {
            EventKind::StartOfTrack => {}
            EventKind::Midi { channel, message } => {
                let status = message.status_nibble() << 4 | channel.as_int();
                if Some(status) != *running_status {
                    out.push(status);
                    *running_status = Some(status);
                }
                out.extend_from_slice(message.data().as_slice());
            }
            EventKind::Meta(meta) => {
                *running_status = None;
                out.extend_from_slice(&[0xFF, meta.type_byte()]);
                write_varlen_slice(&meta.payload(), out)?;
            }
            EventKind::SysEx(data) => {
                *running_status = None;
                out.push(0xF0);
                write_varlen_slice(data, out)?;
            }
            EventKind::Escape(data) => {
                *running_status = None;
                out.push(0xF7);
                write_varlen_slice(data, out)?;
            }
            EventKind::EndOfTrack => {
                *running_status = None;
                out.extend_from_slice(&[0xFF, 0x2F, 0x00]);
            }
        }
        Ok(())
    }

    /// Invoke the handler method corresponding to this event.
    ///
    /// `track` decides whether a name meta event is a sequence name (track 0) or a track name.
    pub fn dispatch<H: Handler + ?Sized>(&self, delta: u28, track: usize, handler: &mut H) {
        match self {
            EventKind::StartOfTrack => handler.start_of_track(track),
            EventKind::Midi { channel, message } => message.dispatch(delta, *channel, handler),
            EventKind::Meta(meta) => meta.dispatch(delta, track, handler),
            EventKind::SysEx(data) => handler.sysex(delta, data),
            EventKind::Escape(data) => handler.escape(delta, data),
            EventKind::EndOfTrack => handler.end_of_track(delta),
        }
    }
}

/// A single event as found on the wire, borrowing its payload from the input.
///
/// Sysex packets are kept separate here; joining continuation packets is up to the track parser.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum RawEvent<'a> {
    Midi { channel: u4, message: MidiMessage },
    Meta { type_byte: u8, data: &'a [u8] },
    SysEx(&'a [u8]),
    Escape(&'a [u8]),
    /// A system common or realtime message, which have no place in a standard midi file.
    System { status: u8, data: &'a [u8] },
}
impl<'a> RawEvent<'a> {
    /// Advances the slice and updates `running_status`.
    ///
    /// In case of failure the slice might be left in the middle of an event!
    pub(crate) fn read(raw: &mut &'a [u8], running_status: &mut Option<u8>) -> Result<RawEvent<'a>> {
        let mut status = *raw
            .first()
            .ok_or_else(|| err_malformed!("failed to read status"))?;
        if status < 0x80 {
            //Running status!
            status = running_status.ok_or_else(|| {
                err_malformed!("event missing status with no running status active")
            })?;
        } else {
            *raw = &raw[1..];
        }
        let event = match status {
            0x80..=0xEF => {
                *running_status = Some(status);
                let data = MidiMessage::read_data(status, raw)?;
                let (channel, message) = MidiMessage::read(status, data);
                RawEvent::Midi { channel, message }
            }
            0xFF => {
                let type_byte = u8::read(raw)?;
                let data = read_varlen_slice(raw)?;
                RawEvent::Meta { type_byte, data }
            }
            0xF0 => RawEvent::SysEx(read_varlen_slice(raw)?),
            0xF7 => RawEvent::Escape(read_varlen_slice(raw)?),
            0xF1..=0xFE => {
                let len = match status {
                    0xF1 | 0xF3 => 1,
                    0xF2 => 2,
                    _ => 0,
                };
                let data = raw
                    .split_checked(len)
                    .ok_or_else(|| err_malformed!("truncated system message"))?;
                RawEvent::System { status, data }
            }
            0x00..=0x7F => bail!(err_malformed!("running status without top bit set")),
        };
        Ok(event)
    }
}

/// Represents a MIDI channel message.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MidiMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u7,
        /// The velocity with which to stop playing it.
        vel: u7,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u7,
        /// The velocity (strength) with which to press it.
        ///
        /// By convention a `NoteOn` message with a velocity of 0 is equivalent to a `NoteOff`,
        /// but it is kept as-is so that files can be rewritten faithfully.
        vel: u7,
    },
    /// Modify the pressure of a note after it has been played.
    PolyPressure { key: u7, pressure: u7 },
    /// Modify the value of a MIDI controller.
    ///
    /// Controllers 120 to 127 are the channel mode messages.
    ControlChange { controller: u7, value: u7 },
    /// Change the program (also known as instrument) for a channel.
    ProgramChange { program: u7 },
    /// Change the pressure of a whole channel at once.
    ChannelPressure { pressure: u7 },
    /// Set the pitch bend value for the entire channel.
    PitchBend { bend: PitchBend },
}
impl MidiMessage {
    /// Midi messages have a known length.
    fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    /// Extract the data bytes from a raw slice.
    fn read_data(status: u8, raw: &mut &[u8]) -> Result<[u7; 2]> {
        let len = Self::msg_length(status);
        let data = raw
            .split_checked(len)
            .ok_or_else(|| err_malformed!("truncated midi message"))?;
        Ok(match len {
            1 => [u7::check_int(data[0])?, u7::from(0)],
            2 => [u7::check_int(data[0])?, u7::check_int(data[1])?],
            _ => [u7::from(0), u7::from(0)],
        })
    }

    /// Receives status byte and midi args separately.
    ///
    /// Must only be called with a MIDI message status (0x80..=0xEF).
    fn read(status: u8, data: [u7; 2]) -> (u4, MidiMessage) {
        let channel = u4::from(status);
        let msg = match status >> 4 {
            0x8 => MidiMessage::NoteOff {
                key: data[0],
                vel: data[1],
            },
            0x9 => MidiMessage::NoteOn {
                key: data[0],
                vel: data[1],
            },
            0xA => MidiMessage::PolyPressure {
                key: data[0],
                pressure: data[1],
            },
            0xB => MidiMessage::ControlChange {
                controller: data[0],
                value: data[1],
            },
            0xC => MidiMessage::ProgramChange { program: data[0] },
            0xD => MidiMessage::ChannelPressure { pressure: data[0] },
            _ => {
                //Note the little-endian order, contrasting with the default big-endian order of
                //Standard Midi Files
                let lsb = data[0].as_int() as u16;
                let msb = data[1].as_int() as u16;
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::from(msb << 7 | lsb)),
                }
            }
        };
        (channel, msg)
    }

    /// Get the raw status nibble for this MIDI message type.
    pub(crate) fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x8,
            MidiMessage::NoteOn { .. } => 0x9,
            MidiMessage::PolyPressure { .. } => 0xA,
            MidiMessage::ControlChange { .. } => 0xB,
            MidiMessage::ProgramChange { .. } => 0xC,
            MidiMessage::ChannelPressure { .. } => 0xD,
            MidiMessage::PitchBend { .. } => 0xE,
        }
    }

    /// The data bytes of this message, not including the status.
    pub fn data(&self) -> DataBytes {
        match *self {
            MidiMessage::NoteOff { key, vel } | MidiMessage::NoteOn { key, vel } => {
                DataBytes::two(key, vel)
            }
            MidiMessage::PolyPressure { key, pressure } => DataBytes::two(key, pressure),
            MidiMessage::ControlChange { controller, value } => DataBytes::two(controller, value),
            MidiMessage::ProgramChange { program } => DataBytes::one(program),
            MidiMessage::ChannelPressure { pressure } => DataBytes::one(pressure),
            MidiMessage::PitchBend { bend } => {
                let raw = bend.0.as_int();
                DataBytes::two(u7::from((raw & 0x7F) as u8), u7::from((raw >> 7) as u8))
            }
        }
    }

    /// Whether this is one of the channel mode messages (controllers 120 to 127).
    pub fn is_channel_mode(&self) -> bool {
        match *self {
            MidiMessage::ControlChange { controller, .. } => controller >= 120,
            _ => false,
        }
    }

    fn dispatch<H: Handler + ?Sized>(&self, delta: u28, channel: u4, handler: &mut H) {
        match *self {
            MidiMessage::NoteOff { key, vel } => handler.note_off(delta, channel, key, vel),
            MidiMessage::NoteOn { key, vel } => handler.note_on(delta, channel, key, vel),
            MidiMessage::PolyPressure { key, pressure } => {
                handler.poly_pressure(delta, channel, key, pressure)
            }
            MidiMessage::ControlChange { controller, value } => {
                handler.control_change(delta, channel, controller, value)
            }
            MidiMessage::ProgramChange { program } => {
                handler.program_change(delta, channel, program)
            }
            MidiMessage::ChannelPressure { pressure } => {
                handler.channel_pressure(delta, channel, pressure)
            }
            MidiMessage::PitchBend { bend } => handler.pitch_bend(delta, channel, bend),
        }
    }
}

/// The one or two data bytes of a channel message.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DataBytes {
    bytes: [u8; 2],
    len: usize,
}
impl DataBytes {
    fn one(a: u7) -> DataBytes {
        DataBytes {
            bytes: [a.as_int(), 0],
            len: 1,
        }
    }

    fn two(a: u7, b: u7) -> DataBytes {
        DataBytes {
            bytes: [a.as_int(), b.as_int()],
            len: 2,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

/// The value of a pitch bend, represented as 14 bits.
///
/// A value of `0x0000` indicates full bend downwards.
/// A value of `0x2000` indicates no bend.
/// A value of `0x3FFF` indicates full bend upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PitchBend(pub u14);
impl PitchBend {
    /// The middle value of `0x2000`, indicating no bend.
    #[inline]
    pub const fn mid_raw_value() -> PitchBend {
        PitchBend(u14::new(0x2000))
    }

    /// Create a `PitchBend` value from an int in the range `[-0x2000, 0x1FFF]`.
    ///
    /// Integers outside this range will be clamped.
    #[inline]
    pub fn from_int(int: i16) -> PitchBend {
        PitchBend(u14::new((int.clamp(-0x2000, 0x1FFF) + 0x2000) as u16))
    }

    /// Returns an int in the range `[-0x2000, 0x1FFF]`.
    #[inline]
    pub fn as_int(self) -> i16 {
        self.0.as_int() as i16 - 0x2000
    }
}

/// The different flavors of text meta events.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TextKind {
    /// Arbitrary text associated to an instant.
    Text,
    /// A copyright notice.
    Copyright,
    /// Information about the name of the current instrument.
    InstrumentName,
    /// Arbitrary lyric information associated to an instant.
    Lyric,
    /// Arbitrary marker text associated to an instant.
    Marker,
    /// Arbitrary cue point text associated to an instant.
    CuePoint,
    /// Information about the name of the current program.
    ProgramName,
    /// Name of the device that this file was intended to be played with.
    DeviceName,
}
impl TextKind {
    fn from_type_byte(type_byte: u8) -> Option<TextKind> {
        Some(match type_byte {
            0x01 => TextKind::Text,
            0x02 => TextKind::Copyright,
            0x04 => TextKind::InstrumentName,
            0x05 => TextKind::Lyric,
            0x06 => TextKind::Marker,
            0x07 => TextKind::CuePoint,
            0x08 => TextKind::ProgramName,
            0x09 => TextKind::DeviceName,
            _ => return None,
        })
    }

    /// The meta type byte of this kind of text event.
    pub fn type_byte(self) -> u8 {
        match self {
            TextKind::Text => 0x01,
            TextKind::Copyright => 0x02,
            TextKind::InstrumentName => 0x04,
            TextKind::Lyric => 0x05,
            TextKind::Marker => 0x06,
            TextKind::CuePoint => 0x07,
            TextKind::ProgramName => 0x08,
            TextKind::DeviceName => 0x09,
        }
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
///
/// The end of track meta event is represented by [`EventKind::EndOfTrack`] instead.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage {
    /// For `Format::Sequential` MIDI file types, `SequenceNumber` can be empty, and defaults to
    /// the track index.
    SequenceNumber(Option<u16>),
    /// Any of the text-carrying meta events except for names.
    Text(TextKind, Vec<u8>),
    /// The name of the sequence (in the first track) or of the track (in every other track).
    TrackName(Vec<u8>),
    /// Number of the MIDI channel that the following events are intended for.
    ChannelPrefix(u4),
    /// Number of the MIDI port that this track was intended to be played with.
    MidiPort(u7),
    /// Amount of microseconds per beat (quarter note).
    Tempo(u24),
    /// The starting point of the track, in SMPTE time.
    SmpteOffset(SmpteTime),
    /// In order of the MIDI specification, numerator, denominator (as a power of two), MIDI
    /// clocks per click, 32nd notes per quarter.
    TimeSignature(u8, u8, u8, u8),
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    /// `false` indicates a major scale, `true` indicates a minor scale.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    SequencerSpecific(Vec<u8>),
    /// An unknown or malformed meta-message.
    ///
    /// The `u8` is the raw meta-message type byte, followed by the raw payload.
    Unknown(u8, Vec<u8>),
}
impl MetaMessage {
    /// Interpret a meta event payload.
    ///
    /// Known types with an unexpected payload length are kept as `Unknown`, so that they are
    /// rewritten exactly as they were read. `0x2F` (end of track) must be handled by the caller.
    pub(crate) fn read(type_byte: u8, data: &[u8]) -> MetaMessage {
        let mut raw = data;
        let known = match (type_byte, data.len()) {
            (0x00, 0) => Some(MetaMessage::SequenceNumber(None)),
            (0x00, 2) => u16::read(&mut raw)
                .ok()
                .map(|num| MetaMessage::SequenceNumber(Some(num))),
            (0x03, _) => Some(MetaMessage::TrackName(data.to_vec())),
            (0x20, 1) => u4::try_from(data[0]).map(MetaMessage::ChannelPrefix),
            (0x21, 1) => u7::try_from(data[0]).map(MetaMessage::MidiPort),
            (0x51, 3) => u24::read(&mut raw).ok().map(MetaMessage::Tempo),
            (0x54, 5) => SmpteTime::read(&mut raw).ok().map(MetaMessage::SmpteOffset),
            (0x58, 4) => Some(MetaMessage::TimeSignature(
                data[0], data[1], data[2], data[3],
            )),
            (0x59, 2) if data[1] <= 1 => {
                Some(MetaMessage::KeySignature(data[0] as i8, data[1] != 0))
            }
            (0x7F, _) => Some(MetaMessage::SequencerSpecific(data.to_vec())),
            (other, _) => {
                TextKind::from_type_byte(other).map(|kind| MetaMessage::Text(kind, data.to_vec()))
            }
        };
        known.unwrap_or_else(|| MetaMessage::Unknown(type_byte, data.to_vec()))
    }

    /// The meta type byte of this message.
    pub fn type_byte(&self) -> u8 {
        match self {
            MetaMessage::SequenceNumber(_) => 0x00,
            MetaMessage::Text(kind, _) => kind.type_byte(),
            MetaMessage::TrackName(_) => 0x03,
            MetaMessage::ChannelPrefix(_) => 0x20,
            MetaMessage::MidiPort(_) => 0x21,
            MetaMessage::Tempo(_) => 0x51,
            MetaMessage::SmpteOffset(_) => 0x54,
            MetaMessage::TimeSignature(..) => 0x58,
            MetaMessage::KeySignature(..) => 0x59,
            MetaMessage::SequencerSpecific(_) => 0x7F,
            MetaMessage::Unknown(type_byte, _) => *type_byte,
        }
    }

    /// The raw payload of this message, as it is written after the type and length.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            MetaMessage::SequenceNumber(None) => Vec::new(),
            MetaMessage::SequenceNumber(Some(num)) => num.to_be_bytes().to_vec(),
            MetaMessage::Text(_, data)
            | MetaMessage::TrackName(data)
            | MetaMessage::SequencerSpecific(data)
            | MetaMessage::Unknown(_, data) => data.clone(),
            MetaMessage::ChannelPrefix(chan) => vec![chan.as_int()],
            MetaMessage::MidiPort(port) => vec![port.as_int()],
            MetaMessage::Tempo(tempo) => tempo.as_int().to_be_bytes()[1..].to_vec(),
            MetaMessage::SmpteOffset(smpte) => smpte.encode().to_vec(),
            MetaMessage::TimeSignature(num, den, clocks, notated) => {
                vec![*num, *den, *clocks, *notated]
            }
            MetaMessage::KeySignature(sharps, minor) => vec![*sharps as u8, *minor as u8],
        }
    }

    fn dispatch<H: Handler + ?Sized>(&self, delta: u28, track: usize, handler: &mut H) {
        match self {
            MetaMessage::SequenceNumber(num) => handler.sequence_number(delta, *num),
            MetaMessage::Text(kind, text) => handler.text(delta, *kind, text),
            MetaMessage::TrackName(name) if track == 0 => handler.sequence_name(delta, name),
            MetaMessage::TrackName(name) => handler.track_name(delta, name),
            MetaMessage::ChannelPrefix(chan) => handler.channel_prefix(delta, *chan),
            MetaMessage::MidiPort(port) => handler.midi_port(delta, *port),
            MetaMessage::Tempo(tempo) => handler.tempo(delta, *tempo),
            MetaMessage::SmpteOffset(smpte) => handler.smpte_offset(delta, *smpte),
            MetaMessage::TimeSignature(num, den, clocks, notated) => {
                handler.time_signature(delta, *num, *den, *clocks, *notated)
            }
            MetaMessage::KeySignature(sharps, minor) => {
                handler.key_signature(delta, *sharps, *minor)
            }
            MetaMessage::SequencerSpecific(data) => handler.sequencer_specific(delta, data),
            MetaMessage::Unknown(type_byte, data) => handler.meta(delta, *type_byte, data),
        }
    }
}
