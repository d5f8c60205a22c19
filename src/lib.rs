//! # Overview
//!
//! `smfkit` reads and writes Standard Midi Files (SMF) through an event-driven interface.
//!
//! The [`Reader`] walks the chunks of a file and calls one method of a [`Handler`] for every
//! event it decodes, in file order. Two handlers come with the crate:
//!
//! - [`SequenceBuilder`] collects the events into an in-memory [`Sequence`].
//! - [`Writer`] serializes every event it receives back into SMF bytes.
//!
//! Any other type implementing [`Handler`] can sit in between, for example to filter or modify
//! events while copying a file.
//!
//! ```rust
//! use smfkit::{Sequence, Category};
//!
//! let bytes = [
//!     0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x60,
//!     0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x0C,
//!     0x00, 0x90, 0x40, 0x40, 0x60, 0x80, 0x40, 0x40, 0x00, 0xFF, 0x2F, 0x00,
//! ];
//! let seq = Sequence::parse(&bytes).unwrap();
//! let notes = seq.events_of(Category::ChannelVoice).count();
//! assert_eq!(notes, 2);
//! ```
//!
//! # Copying with modifications
//!
//! Because the [`Writer`] is just another handler, copying a file is a matter of pointing the
//! reader at a writer. Wrapping the writer in a handler that forwards modified events is enough
//! to, say, transpose a whole song:
//!
//! ```rust
//! use smfkit::{Handler, Writer, num::{u4, u7, u28}};
//! # use smfkit::{Format, Timing};
//!
//! struct Transpose<H>(H, i8);
//! impl<H: Handler> Handler for Transpose<H> {
//!     fn note_on(&mut self, delta: u28, channel: u4, key: u7, vel: u7) {
//!         let key = u7::new((key.as_int() as i8 + self.1) as u8);
//!         self.0.note_on(delta, channel, key, vel)
//!     }
//!     // ...every other method forwards to `self.0` unchanged
//! #   fn header(&mut self, f: Format, n: u16, t: Timing) { self.0.header(f, n, t) }
//! #   fn start_of_track(&mut self, i: usize) { self.0.start_of_track(i) }
//! #   fn end_of_track(&mut self, d: u28) { self.0.end_of_track(d) }
//! #   fn eof(&mut self) { self.0.eof() }
//! }
//! # let _ = Transpose(Writer::new(Vec::new()), 12);
//! ```
//!
//! # Tolerance
//!
//! Files found in the wild often bend the format. By default irregularities that can be read
//! unambiguously (a format 0 file with several tracks, bytes after the end of a track, an
//! unterminated sysex...) are logged through the [`log`](https://docs.rs/log) facade and listed
//! in [`ReadReport::warnings`], but otherwise ignored. [`Reader::strict`] (or the `strict` cargo feature) turns them into errors,
//! while [`Reader::recover`] keeps reading past a broken track.
//!
//! # RIFF RMID files
//!
//! Files wrapped in a RIFF `RMID` container are unwrapped transparently.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, ErrorKind, Result},
        primitive::{u14, u15, u24, u28, u4, u7, IntRead, SplitChecked},
    };
    pub(crate) use core::{convert::TryFrom, fmt, mem};
    pub(crate) use log::{debug, trace, warn};
    pub(crate) use std::{io, vec::Vec};
}

mod event;
#[macro_use]
mod handler;
mod primitive;
mod riff;
mod sequence;
mod smf;
mod writer;

pub use crate::{
    error::{Error, ErrorKind, Result},
    event::{
        Category, DataBytes, Event, EventKind, MetaMessage, MidiMessage, PitchBend, TextKind,
    },
    handler::{Handler, Ignore},
    primitive::{Format, Fps, SmpteTime, Timing},
    sequence::{Merged, Sequence, SequenceBuilder, Track},
    smf::{read, ReadReport, Reader},
    writer::Writer,
};

/// The integer codec of the SMF format.
pub mod codec {
    pub use crate::primitive::{
        read_fixed_width, read_varlen, sizeof_varlen, write_fixed_width, write_varlen,
    };
}

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u24, u28, u4, u7};
}

#[cfg(test)]
mod test;
