//! MessagePack argument decoding and result encoding.
//!
//! Decoding walks a cursor (`&mut &[u8]`) over the caller's argument buffer and
//! never reads past its end: running out of bytes is a [`CallError::Malformed`].
//! Encoding writes into a fixed-capacity [`ResultBuf`] and fails instead of
//! overrunning it.

use std::io;

use rmp::decode::{self, NumValueReadError, ValueReadError};
use rmp::encode;

use crate::error::CallError;

/// Capacity of a result buffer. The widest unsigned encoding is 9 bytes.
pub const RESULT_BUF_CAP: usize = 16;

/// Stack-lifetime buffer holding one call's encoded result.
#[derive(Clone)]
pub struct ResultBuf {
    bytes: [u8; RESULT_BUF_CAP],
    len: usize,
}

impl ResultBuf {
    pub fn new() -> Self {
        Self {
            bytes: [0u8; RESULT_BUF_CAP],
            len: 0,
        }
    }

    /// The written extent; never includes unwritten capacity.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Default for ResultBuf {
    fn default() -> Self {
        Self::new()
    }
}

fn read_failure(what: &str, err: io::Error) -> CallError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CallError::malformed(format!("buffer ends inside {what}"))
    } else {
        CallError::malformed(format!("failed to read {what}: {err}"))
    }
}

/// Reads an array header and returns the declared element count.
pub fn decode_array_len(cur: &mut &[u8]) -> Result<u32, CallError> {
    decode::read_array_len(cur).map_err(|err| match err {
        ValueReadError::InvalidMarkerRead(e) | ValueReadError::InvalidDataRead(e) => {
            read_failure("array header", e)
        }
        ValueReadError::TypeMismatch(marker) => CallError::NotAnArray {
            found: format!("{marker:?}"),
        },
    })
}

/// Reads an unsigned integer of any encoded width that fits in `u32`.
///
/// `index` is the argument position, used only for error reporting.
pub fn decode_uint(cur: &mut &[u8], index: u32) -> Result<u32, CallError> {
    decode::read_int::<u32, _>(cur).map_err(|err| match err {
        NumValueReadError::InvalidMarkerRead(e) | NumValueReadError::InvalidDataRead(e) => {
            read_failure(&format!("argument #{}", index + 1), e)
        }
        NumValueReadError::TypeMismatch(marker) => CallError::ArgumentType {
            index,
            found: format!("{marker:?}"),
        },
        NumValueReadError::OutOfRange => CallError::ArgumentType {
            index,
            found: "an integer outside 0..=4294967295".to_string(),
        },
    })
}

/// Decodes an array of exactly `N` unsigned integers spanning the whole buffer.
pub fn decode_uint_array<const N: usize>(args: &[u8]) -> Result<[u32; N], CallError> {
    let mut cur = args;
    let actual = decode_array_len(&mut cur)?;
    let expected = u32::try_from(N).map_err(|_| CallError::malformed("argument count too large"))?;
    if actual != expected {
        return Err(CallError::ArgumentCount { expected, actual });
    }

    let mut out = [0u32; N];
    for (i, slot) in (0u32..).zip(out.iter_mut()) {
        *slot = decode_uint(&mut cur, i)?;
    }

    if !cur.is_empty() {
        return Err(CallError::malformed(format!(
            "{} trailing bytes after arguments",
            cur.len()
        )));
    }
    Ok(out)
}

/// Decodes the `[a, b]` operand pair taken by `sum`.
pub fn decode_pair(args: &[u8]) -> Result<(u32, u32), CallError> {
    let [a, b] = decode_uint_array::<2>(args)?;
    Ok((a, b))
}

/// Appends the smallest unsigned encoding of `value` and returns the written extent.
pub fn encode_uint(buf: &mut ResultBuf, value: u64) -> Result<&[u8], CallError> {
    let start = buf.len;
    let mut wr: &mut [u8] = &mut buf.bytes[start..];
    let free = wr.len();
    encode::write_uint(&mut wr, value).map_err(|_| CallError::ResultOverflow)?;
    let written = free - wr.len();
    buf.len = start + written;
    Ok(buf.as_bytes())
}
