//! RMID files are Standard Midi Files embedded in a RIFF container.
//!
//! The container is a `RIFF` chunk of form type `RMID`, holding a `data` subchunk with the raw SMF
//! bytes and possibly other subchunks with metadata, which are ignored.

use crate::prelude::*;

/// Iterates over RIFF chunks, yielding their id and body.
///
/// RIFF lengths are little-endian, and odd-sized chunks are followed by a pad byte.
struct RiffChunks<'a> {
    raw: &'a [u8],
}
impl<'a> Iterator for RiffChunks<'a> {
    type Item = ([u8; 4], &'a [u8]);
    fn next(&mut self) -> Option<([u8; 4], &'a [u8])> {
        let head = self.raw.split_checked(8)?;
        let mut id = [0; 4];
        id.copy_from_slice(&head[..4]);
        let len = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
        let body = match self.raw.split_checked(len) {
            Some(body) => body,
            //Truncated container, keep whatever is there
            None => mem::take(&mut self.raw),
        };
        if len % 2 == 1 {
            let _pad = self.raw.split_checked(1);
        }
        Some((id, body))
    }
}

/// Strip the RIFF wrapping around an SMF file.
///
/// Fails if `raw` is not an RMID file.
pub(crate) fn unwrap(raw: &[u8]) -> Result<&[u8]> {
    let (id, mut form) = RiffChunks { raw }
        .next()
        .ok_or_else(|| err_invalid!("no main riff chunk"))?;
    ensure!(&id == b"RIFF", err_invalid!("invalid main riff chunk"));
    let form_type = form
        .split_checked(4)
        .ok_or_else(|| err_invalid!("failed to read riff form type"))?;
    ensure!(form_type == b"RMID", err_invalid!("not an rmid riff file"));
    RiffChunks { raw: form }
        .find(|(id, _)| id == b"data")
        .map(|(_, data)| data)
        .ok_or_else(|| err_invalid!("no rmid data chunk"))
}
