//! Simple building-block data that can be read in one go.
//!
//! This is the integer codec of the SMF format: fixed-width big-endian integers and MIDI
//! variable-length quantities, plus the small restricted integer types that the rest of the crate
//! uses to make out-of-range values unrepresentable.
//! The slice-based readers advance the slice they read from.

use crate::prelude::*;

pub(crate) trait SplitChecked: Sized {
    fn split_checked(&mut self, at: usize) -> Option<Self>;
}
impl<'a> SplitChecked for &'a [u8] {
    #[inline]
    fn split_checked(&mut self, at: usize) -> Option<&'a [u8]> {
        if at > self.len() {
            None
        } else {
            let (extracted, remainder) = self.split_at(at);
            *self = remainder;
            Some(extracted)
        }
    }
}

/// Implemented on integer types for reading as big-endian.
pub(crate) trait IntRead: Sized {
    /// Reads a big-endian integer.
    fn read(data: &mut &[u8]) -> Result<Self>;
}

/// Implement simple big endian integer reads.
macro_rules! impl_read_int {
    {$( $int:ty ),*} => {
        $(
            impl IntRead for $int {
                #[inline]
                fn read(raw: &mut &[u8]) -> Result<$int> {
                    let bytes = raw.split_checked(mem::size_of::<$int>())
                        .ok_or_else(|| err_malformed!("failed to read the expected integer"))?;
                    Ok(bytes.iter().fold(0 as $int, |acc, byte| {
                        acc.checked_shl(8).unwrap_or(0) | *byte as $int
                    }))
                }
            }
        )*
    }
}
impl_read_int! {u8,u16,u32}

/// Slightly restricted integers.
macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        impl From<$inner> for $name {
            /// Lossy conversion, loses top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::from_int_lossy(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {restricted.0}
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The maximum value that this restricted integer can hold.
            #[inline]
            pub const fn max_value() -> $name {
                $name (Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name (raw & Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn from_int_lossy(raw: $inner) -> $name {
                $name (raw & Self::MASK)
            }

            /// Returns `Some` if the raw integer is within range of the restricted integer, and
            /// `None` otherwise.
            #[inline]
            pub fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                } else {
                    None
                }
            }

            /// Get the inner integer out of the wrapper.
            /// The inner integer is guaranteed to be in range of the restricted wrapper.
            #[inline]
            pub fn as_int(self) -> $inner {
                Into::into(self)
            }

            #[allow(dead_code)]
            #[inline]
            pub(crate) fn check_int(raw: $inner) -> Result<$name> {
                Self::try_from(raw).ok_or_else(
                    || err_malformed!("invalid integer with top bits set")
                )
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
        impl PartialOrd<$inner> for $name {
            fn partial_cmp(&self, rhs: &$inner) -> Option<core::cmp::Ordering> {
                Some(self.as_int().cmp(rhs))
            }
        }
    };
}
restricted_int! {
    /// A 28-bit integer type, referred to in the MIDI spec as "variable length int".
    ///
    /// Wraps the `u32` type and ensures that the top 4 bits are always zero.
    u28: u32 => 28
}
restricted_int! {
    /// A 24-bit integer type.
    ///
    /// Wraps the `u32` type and ensures that the top 8 bits are always zero.
    u24: u32 => 24
}
restricted_int! {
    /// A 15-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top bit is always zero.
    u15: u16 => 15
}
restricted_int! {
    /// A 14-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top two bits are always zero.
    u14: u16 => 14
}
restricted_int! {
    /// A 7-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top bit is always zero.
    u7: u8 => 7
}
restricted_int! {
    /// A 4-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top 4 bits are always zero.
    u4: u8 => 4
}

impl IntRead for u24 {
    fn read(raw: &mut &[u8]) -> Result<u24> {
        let bytes = raw
            .split_checked(3)
            .ok_or_else(|| err_malformed!("failed to read u24 bytes"))?;
        //Using lossy `from` because value is guaranteed to be 24 bits (3 bytes)
        Ok(u24::from(
            bytes.iter().fold(0u32, |acc, byte| acc << 8 | *byte as u32),
        ))
    }
}

impl u28 {
    /// Read a varlen integer, advancing the slice.
    ///
    /// Fails if the slice ends in the middle of the integer, or if the integer spans more than
    /// 4 bytes.
    pub(crate) fn read_varlen(raw: &mut &[u8]) -> Result<u28> {
        let mut int: u32 = 0;
        for _ in 0..4 {
            let byte = u8::read(raw).map_err(|_| err_malformed!("truncated varlen integer"))?;
            int <<= 7;
            int |= (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                //Since we did at max 4 reads of 7 bits each, there MUST be at max 28 bits in this int
                return Ok(u28::from(int));
            }
        }
        bail!(err_malformed!("varlen integer larger than 4 bytes"))
    }

    /// Append the minimal varlen encoding of this integer.
    pub(crate) fn write_varlen(self, out: &mut Vec<u8>) {
        let int = self.as_int();
        let mut skipping = true;
        for i in (0..4).rev() {
            let byte = ((int >> (i * 7)) & 0x7F) as u8;
            if skipping && byte == 0 && i != 0 {
                //Skip these leading zeros
            } else {
                //Write down this u7
                skipping = false;
                let byte = if i == 0 {
                    //Last byte
                    byte
                } else {
                    //Leading byte
                    byte | 0x80
                };
                out.push(byte);
            }
        }
    }
}

/// Interpret 1, 2 or 4 bytes as an unsigned big-endian integer.
///
/// Any other amount of bytes is rejected with [`ErrorKind::MalformedValue`].
pub fn read_fixed_width(bytes: &[u8]) -> Result<u32> {
    let mut raw = bytes;
    match bytes.len() {
        1 => Ok(u8::read(&mut raw)? as u32),
        2 => Ok(u16::read(&mut raw)? as u32),
        4 => u32::read(&mut raw),
        _ => bail!(err_malformed!("fixed width integers must be 1, 2 or 4 bytes long")),
    }
}

/// Encode `value` as a big-endian integer of exactly `width` bytes.
///
/// `width` must be 1, 2 or 4, and `value` must fit in it.
pub fn write_fixed_width(value: u32, width: usize) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    match width {
        1 | 2 | 4 => {
            let (high, low) = bytes.split_at(4 - width);
            ensure!(
                high.iter().all(|&b| b == 0),
                err_malformed!("value does not fit in the requested width")
            );
            Ok(low.to_vec())
        }
        _ => bail!(err_malformed!("fixed width integers must be 1, 2 or 4 bytes long")),
    }
}

/// Decode a varlen integer from the start of `bytes`.
///
/// Returns the decoded integer and the amount of bytes it took up. Extra bytes after the integer
/// are ignored.
pub fn read_varlen(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut raw = bytes;
    let int = u28::read_varlen(&mut raw)?;
    Ok((int.as_int(), bytes.len() - raw.len()))
}

/// Encode an integer as a minimal varlen integer (1 to 4 bytes).
///
/// Values above `0x0FFFFFFF` cannot be represented.
pub fn write_varlen(value: u32) -> Result<Vec<u8>> {
    let int = u28::try_from(value)
        .ok_or_else(|| err_malformed!("varlen integers cannot exceed 28 bits"))?;
    let mut out = Vec::with_capacity(sizeof_varlen(value));
    int.write_varlen(&mut out);
    Ok(out)
}

/// How many bytes [`write_varlen`] produces for `value`.
///
/// Out-of-range values report 4 bytes.
pub fn sizeof_varlen(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

/// Reads a slice represented in the input as a varlen `len` followed by `len` bytes.
pub(crate) fn read_varlen_slice<'a>(raw: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = u28::read_varlen(raw)?.as_int();
    raw.split_checked(len as usize)
        .ok_or_else(|| err_malformed!("truncated varlen-prefixed payload"))
}

/// Write a slice as its varlen length followed by the raw bytes.
pub(crate) fn write_varlen_slice(slice: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(slice.len())
        .ok()
        .and_then(u28::try_from)
        .ok_or_else(|| err_malformed!("payload length exceeds 28 bits"))?;
    len.write_varlen(out);
    out.extend_from_slice(slice);
    Ok(())
}

/// The order in which tracks should be laid out when playing back this SMF file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// This file should have a single track only.
    ///
    /// Files declaring this format with a different amount of tracks are accepted with a
    /// warning, unless reading in strict mode.
    SingleTrack,
    /// This file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
    /// This file has several tracks, each one a separate song.
    Sequential,
}
impl Format {
    pub(crate) fn read(raw: &mut &[u8]) -> Result<Format> {
        let format = u16::read(raw)?;
        Ok(match format {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            2 => Format::Sequential,
            _ => bail!(err_invalid!("unsupported smf format")),
        })
    }

    /// The numeric code of this format, as stored in the header chunk.
    pub fn as_int(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }

    pub(crate) fn encode(&self) -> [u8; 2] {
        self.as_int().to_be_bytes()
    }
}

/// The timing for an SMF file (the "division" field of the header).
/// This can be in ticks/beat or ticks/second.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Timing {
    /// Specifies ticks/beat as a 15-bit integer.
    ///
    /// The length of a beat is not standard, so in order to fully describe the length of a MIDI
    /// tick the tempo meta event should be present.
    Metrical(u15),
    /// Specifies ticks/second by dividing a second into frames and then into subframes.
    ///
    /// Both bytes are kept exactly as found in the file, so `fps` might not be one of the four
    /// standard SMPTE rates. See [`Timing::fps`].
    Timecode {
        /// Frames per second.
        fps: u8,
        /// Ticks per frame.
        subframes: u8,
    },
}
impl Timing {
    pub(crate) fn read(raw: &mut &[u8]) -> Result<Timing> {
        let raw = u16::read(raw)?;
        Ok(Timing::from_raw(raw))
    }

    /// Decode the raw 16-bit division field.
    pub fn from_raw(raw: u16) -> Timing {
        if raw & 0x8000 != 0 {
            //Timecode, the top byte is a negative two's complement fps
            let [fps, subframes] = raw.to_be_bytes();
            Timing::Timecode {
                fps: (fps as i8).wrapping_neg() as u8,
                subframes,
            }
        } else {
            Timing::Metrical(u15::from(raw))
        }
    }

    /// The raw 16-bit division field.
    pub fn as_raw(&self) -> u16 {
        u16::from_be_bytes(self.encode())
    }

    /// The standard SMPTE frame rate of a timecode timing, if it is one.
    pub fn fps(&self) -> Option<Fps> {
        match *self {
            Timing::Metrical(_) => None,
            Timing::Timecode { fps, .. } => Fps::from_int(fps),
        }
    }

    pub(crate) fn encode(&self) -> [u8; 2] {
        match *self {
            Timing::Metrical(ticksperbeat) => ticksperbeat.as_int().to_be_bytes(),
            Timing::Timecode { fps, subframes } => [(fps as i8).wrapping_neg() as u8, subframes],
        }
    }
}

/// A timestamp encoding an SMPTE time of the day.
///
/// Enforces several guarantees:
///
/// - `hour` is inside [0, 23]
/// - `minute` is inside [0, 59]
/// - `second` is inside [0, 59]
/// - `frame` is inside [0, fps - 1]
/// - `subframe` is inside [0, 99]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SmpteTime {
    hour: u8,
    minute: u8,
    second: u8,
    frame: u8,
    subframe: u8,
    fps: Fps,
}
impl SmpteTime {
    /// Create a new SMPTE timestamp with the given information.
    #[inline]
    pub fn new(
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
        fps: Fps,
    ) -> Option<SmpteTime> {
        macro_rules! check {
            ($cond:expr) => {{
                if !{ $cond } {
                    return None;
                }
            }};
        }
        check!(hour < 24);
        check!(minute < 60);
        check!(second < 60);
        check!(frame < fps.as_int());
        check!(subframe < 100);
        Some(SmpteTime {
            hour,
            minute,
            second,
            frame,
            subframe,
            fps,
        })
    }

    #[inline]
    pub fn hour(&self) -> u8 {
        self.hour
    }

    #[inline]
    pub fn minute(&self) -> u8 {
        self.minute
    }

    #[inline]
    pub fn second(&self) -> u8 {
        self.second
    }

    /// Get the frame component of this timestamp.
    /// The meaning of this value depends on the value of `fps`.
    #[inline]
    pub fn frame(&self) -> u8 {
        self.frame
    }

    /// Get the subframe component of this timestamp (hundredths of a frame).
    #[inline]
    pub fn subframe(&self) -> u8 {
        self.subframe
    }

    #[inline]
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// Decode the 5-byte payload of an SMPTE offset meta event.
    pub(crate) fn read(raw: &mut &[u8]) -> Result<SmpteTime> {
        let data = raw
            .split_checked(5)
            .ok_or_else(|| err_malformed!("failed to read smpte time data"))?;
        let hour_fps = data[0];
        let (hour, fps) = (hour_fps & 0x1F, (hour_fps >> 5) & 0x03);
        let fps = Fps::from_code(fps);
        SmpteTime::new(hour, data[1], data[2], data[3], data[4], fps)
            .ok_or_else(|| err_malformed!("invalid smpte time"))
    }

    pub(crate) fn encode(&self) -> [u8; 5] {
        let hour_fps = self.hour() | self.fps().as_code() << 5;
        [
            hour_fps,
            self.minute(),
            self.second(),
            self.frame(),
            self.subframe(),
        ]
    }
}

/// One of the four FPS values available for SMPTE times, as defined by the MIDI standard.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Fps {
    /// 24 frames per second.
    Fps24,
    /// 25 frames per second.
    Fps25,
    /// Actually `29.97 = 30 / 1.001` frames per second.
    ///
    /// Quite an exotic value because of interesting historical reasons.
    Fps29,
    /// 30 frames per second.
    Fps30,
}
impl Fps {
    /// Does the conversion from a 2-bit fps code to an `Fps` value.
    fn from_code(code: u8) -> Fps {
        match code & 0x03 {
            0 => Fps::Fps24,
            1 => Fps::Fps25,
            2 => Fps::Fps29,
            _ => Fps::Fps30,
        }
    }

    /// Does the conversion to a 2-bit fps code.
    fn as_code(self) -> u8 {
        match self {
            Fps::Fps24 => 0,
            Fps::Fps25 => 1,
            Fps::Fps29 => 2,
            Fps::Fps30 => 3,
        }
    }

    /// Converts an integer representing the semantic fps to an `Fps` value (ie. `24` -> `Fps24`).
    #[inline]
    pub fn from_int(raw: u8) -> Option<Fps> {
        Some(match raw {
            24 => Fps::Fps24,
            25 => Fps::Fps25,
            29 => Fps::Fps29,
            30 => Fps::Fps30,
            _ => return None,
        })
    }

    /// Get the integral approximate fps out.
    #[inline]
    pub fn as_int(self) -> u8 {
        match self {
            Fps::Fps24 => 24,
            Fps::Fps25 => 25,
            Fps::Fps29 => 29,
            Fps::Fps30 => 30,
        }
    }
}
