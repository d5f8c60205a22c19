//! The callback interface between the reader and whatever consumes the events.

use crate::{
    event::{PitchBend, TextKind},
    prelude::*,
    primitive::{Format, SmpteTime, Timing},
};

/// Receives the events of a Standard Midi File, one method call per event.
///
/// Every method has a default implementation that does nothing, so implementors only need to
/// override the events they care about.
///
/// The [`Reader`](crate::Reader) calls these methods in file order: `header` once, then for every
/// track `start_of_track`, the track events and `end_of_track`, and finally `eof`.
/// Every event carries its delta time, in ticks since the previous event of the same track.
/// Sysex messages split into several packets arrive already joined, with the delta times of all
/// packets added up.
#[allow(unused_variables)]
pub trait Handler {
    /// The header chunk was read.
    ///
    /// `track_count` is the amount of tracks the header declares, which might not match the
    /// amount of tracks actually present.
    fn header(&mut self, format: Format, track_count: u16, timing: Timing) {}

    /// A new track starts. Tracks are numbered from 0.
    fn start_of_track(&mut self, track: usize) {}

    /// The current track ended.
    fn end_of_track(&mut self, delta: u28) {}

    /// There are no more tracks.
    fn eof(&mut self) {}

    fn note_off(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {}

    fn note_on(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {}

    fn poly_pressure(&mut self, delta: u28, channel: u4, key: u7, pressure: u7) {}

    /// Includes the channel mode messages (controllers 120 to 127).
    fn control_change(&mut self, delta: u28, channel: u4, controller: u7, value: u7) {}

    fn program_change(&mut self, delta: u28, channel: u4, program: u7) {}

    fn channel_pressure(&mut self, delta: u28, channel: u4, pressure: u7) {}

    fn pitch_bend(&mut self, delta: u28, channel: u4, bend: PitchBend) {}

    fn sequence_number(&mut self, delta: u28, number: Option<u16>) {}

    /// Any of the text meta events, except for names.
    fn text(&mut self, delta: u28, kind: TextKind, text: &[u8]) {}

    /// A name meta event found in the first track.
    fn sequence_name(&mut self, delta: u28, name: &[u8]) {}

    /// A name meta event found in any track except the first.
    fn track_name(&mut self, delta: u28, name: &[u8]) {}

    fn channel_prefix(&mut self, delta: u28, channel: u4) {}

    fn midi_port(&mut self, delta: u28, port: u7) {}

    /// Microseconds per beat.
    fn tempo(&mut self, delta: u28, tempo: u24) {}

    fn smpte_offset(&mut self, delta: u28, offset: SmpteTime) {}

    /// Numerator, denominator as a power of two, MIDI clocks per click and 32nd notes per beat.
    fn time_signature(
        &mut self,
        delta: u28,
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        notated_32nds: u8,
    ) {
    }

    fn key_signature(&mut self, delta: u28, sharps: i8, minor: bool) {}

    fn sequencer_specific(&mut self, delta: u28, data: &[u8]) {}

    /// Any meta event without a more specific method, including known meta types whose payload
    /// could not be interpreted.
    fn meta(&mut self, delta: u28, meta_type: u8, data: &[u8]) {}

    /// A complete system exclusive message, without the leading `0xF0`.
    fn sysex(&mut self, delta: u28, data: &[u8]) {}

    /// An escape sequence, carrying arbitrary bytes.
    fn escape(&mut self, delta: u28, data: &[u8]) {}

    /// A system common or realtime message (status `0xF1` to `0xFE`) found inside a track,
    /// where it has no meaning.
    ///
    /// `delta` is the delta time of the message itself. Since most consumers drop these, the
    /// reader also carries it over to the next event, so that skipping this call keeps every
    /// other event at its absolute time.
    fn invalid_event(&mut self, delta: u28, status: u8, data: &[u8]) {}
}

/// A handler that ignores every event.
///
/// Useful to validate a file without keeping any of it.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ignore;
impl Handler for Ignore {}

/// Implement every event method of [`Handler`] by building an [`EventKind`](crate::EventKind)
/// and passing it to an inherent `push(&mut self, delta: u28, kind: EventKind)` method.
///
/// The structural methods (`header`, `start_of_track`, `end_of_track` and `eof`) are given
/// inside the braces. A meta event of type `0x2F` is pushed as an end of track. Invalid events
/// are dropped, their delta time already being carried to the next event.
macro_rules! handler_via_push {
    (impl[$($gen:tt)*] $ty:ty { $($structural:tt)* }) => {
        impl<$($gen)*> $crate::handler::Handler for $ty {
            $($structural)*

            fn note_off(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {
                self.push_midi(delta, channel, MidiMessage::NoteOff { key, vel })
            }

            fn note_on(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {
                self.push_midi(delta, channel, MidiMessage::NoteOn { key, vel })
            }

            fn poly_pressure(&mut self, delta: u28, channel: u4, key: u7, pressure: u7) {
                self.push_midi(delta, channel, MidiMessage::PolyPressure { key, pressure })
            }

            fn control_change(&mut self, delta: u28, channel: u4, controller: u7, value: u7) {
                self.push_midi(delta, channel, MidiMessage::ControlChange { controller, value })
            }

            fn program_change(&mut self, delta: u28, channel: u4, program: u7) {
                self.push_midi(delta, channel, MidiMessage::ProgramChange { program })
            }

            fn channel_pressure(&mut self, delta: u28, channel: u4, pressure: u7) {
                self.push_midi(delta, channel, MidiMessage::ChannelPressure { pressure })
            }

            fn pitch_bend(&mut self, delta: u28, channel: u4, bend: PitchBend) {
                self.push_midi(delta, channel, MidiMessage::PitchBend { bend })
            }

            fn sequence_number(&mut self, delta: u28, number: Option<u16>) {
                self.push_meta(delta, MetaMessage::SequenceNumber(number))
            }

            fn text(&mut self, delta: u28, kind: TextKind, text: &[u8]) {
                self.push_meta(delta, MetaMessage::Text(kind, text.to_vec()))
            }

            fn sequence_name(&mut self, delta: u28, name: &[u8]) {
                self.push_meta(delta, MetaMessage::TrackName(name.to_vec()))
            }

            fn track_name(&mut self, delta: u28, name: &[u8]) {
                self.push_meta(delta, MetaMessage::TrackName(name.to_vec()))
            }

            fn channel_prefix(&mut self, delta: u28, channel: u4) {
                self.push_meta(delta, MetaMessage::ChannelPrefix(channel))
            }

            fn midi_port(&mut self, delta: u28, port: u7) {
                self.push_meta(delta, MetaMessage::MidiPort(port))
            }

            fn tempo(&mut self, delta: u28, tempo: u24) {
                self.push_meta(delta, MetaMessage::Tempo(tempo))
            }

            fn smpte_offset(&mut self, delta: u28, offset: SmpteTime) {
                self.push_meta(delta, MetaMessage::SmpteOffset(offset))
            }

            fn time_signature(
                &mut self,
                delta: u28,
                numerator: u8,
                denominator: u8,
                clocks_per_click: u8,
                notated_32nds: u8,
            ) {
                self.push_meta(
                    delta,
                    MetaMessage::TimeSignature(
                        numerator,
                        denominator,
                        clocks_per_click,
                        notated_32nds,
                    ),
                )
            }

            fn key_signature(&mut self, delta: u28, sharps: i8, minor: bool) {
                self.push_meta(delta, MetaMessage::KeySignature(sharps, minor))
            }

            fn sequencer_specific(&mut self, delta: u28, data: &[u8]) {
                self.push_meta(delta, MetaMessage::SequencerSpecific(data.to_vec()))
            }

            fn meta(&mut self, delta: u28, meta_type: u8, data: &[u8]) {
                if meta_type == 0x2F {
                    self.push(delta, EventKind::EndOfTrack)
                } else {
                    self.push_meta(delta, MetaMessage::Unknown(meta_type, data.to_vec()))
                }
            }

            fn sysex(&mut self, delta: u28, data: &[u8]) {
                self.push(delta, EventKind::SysEx(data.to_vec()))
            }

            fn escape(&mut self, delta: u28, data: &[u8]) {
                self.push(delta, EventKind::Escape(data.to_vec()))
            }
        }

        impl<$($gen)*> $ty {
            #[inline]
            fn push_midi(&mut self, delta: u28, channel: u4, message: MidiMessage) {
                self.push(delta, EventKind::Midi { channel, message })
            }

            #[inline]
            fn push_meta(&mut self, delta: u28, meta: MetaMessage) {
                self.push(delta, EventKind::Meta(meta))
            }
        }
    };
}
