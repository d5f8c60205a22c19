use core::fmt;
use thiserror::Error;

/// Represents an error while reading or writing a Standard Midi File.
///
/// Wraps an [`ErrorKind`] together with the place where it happened: the index of the track being
/// processed (if any) and the byte offset from the start of the input (if known).
///
/// For more information about the error policy used by `smfkit`, see [`ErrorKind`].
#[derive(Debug, Error)]
#[error("{kind}{location}")]
pub struct Error {
    kind: ErrorKind,
    location: Location,
}
impl Error {
    /// Create a new error with the given `ErrorKind` and no location information.
    #[inline]
    pub fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            location: Location::default(),
        }
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The index of the track that was being processed, if the error happened inside a track.
    #[inline]
    pub fn track(&self) -> Option<usize> {
        self.location.track
    }

    /// Byte offset from the start of the input where the error was detected, if known.
    #[inline]
    pub fn offset(&self) -> Option<usize> {
        self.location.offset
    }

    /// Attach a track index, unless one is already present.
    pub(crate) fn in_track(mut self, track: usize) -> Error {
        self.location.track.get_or_insert(track);
        self
    }

    /// Attach a byte offset, unless one is already present.
    pub(crate) fn at(mut self, offset: usize) -> Error {
        self.location.offset.get_or_insert(offset);
        self
    }
}
impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}
impl From<std::io::Error> for Error {
    #[inline]
    fn from(err: std::io::Error) -> Error {
        Error::new(ErrorKind::Io(err))
    }
}

/// The type of error that occurred.
///
/// Decoding errors at the byte level (`InvalidFormat`, `MalformedValue`, `ChunkLengthMismatch`)
/// always abort the track being parsed, since there is no way to resynchronize inside a track.
/// `UnterminatedSysEx` is only raised in strict mode, and only after the accumulated payload was
/// delivered to the handler. Outside of strict mode it ends up in
/// [`ReadReport::warnings`](crate::ReadReport::warnings), like every other tolerated irregularity.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A structurally required signature is wrong, or the file declares an unsupported format.
    ///
    /// It is likely that the input is not a MIDI file at all.
    #[error("invalid midi format: {0}")]
    InvalidFormat(&'static str),

    /// A fixed-width integer, varlen integer or event payload could not be interpreted.
    #[error("malformed midi value: {0}")]
    MalformedValue(&'static str),

    /// The events of a track do not end exactly where the track chunk says it ends.
    #[error("track chunk declares {declared} bytes, but its events take up {consumed} bytes")]
    ChunkLengthMismatch {
        /// The length in the chunk header.
        declared: usize,
        /// The amount of bytes the last event would need to be complete.
        consumed: usize,
    },

    /// A system exclusive message ended without the `0xF7` terminator.
    #[error("unterminated sysex message ({len} bytes)")]
    UnterminatedSysEx {
        /// Length of the accumulated payload.
        len: usize,
    },

    /// The output sink failed.
    #[error("i/o error: {0}")]
    Io(#[source] std::io::Error),
}
impl ErrorKind {
    /// Get the informative message on what exact part of the MIDI format was not respected, if
    /// this error carries one.
    #[inline]
    pub fn message(&self) -> Option<&'static str> {
        match *self {
            ErrorKind::InvalidFormat(msg) => Some(msg),
            ErrorKind::MalformedValue(msg) => Some(msg),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Location {
    track: Option<usize>,
    offset: Option<usize>,
}
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.track, self.offset) {
            (None, None) => Ok(()),
            (Some(track), None) => write!(f, " (track {})", track),
            (None, Some(offset)) => write!(f, " (offset {:#x})", offset),
            (Some(track), Some(offset)) => write!(f, " (track {}, offset {:#x})", track, offset),
        }
    }
}

macro_rules! err_invalid {
    ($msg:expr) => {{
        $crate::error::Error::new($crate::error::ErrorKind::InvalidFormat($msg))
    }};
}
macro_rules! err_malformed {
    ($msg:expr) => {{
        $crate::error::Error::new($crate::error::ErrorKind::MalformedValue($msg))
    }};
}

/// The result type used throughout the crate.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
