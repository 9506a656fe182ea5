//! The procedures themselves, written against [`Host`] so they run the same
//! under the database and in tests.

use crate::codec::{self, ResultBuf};
use crate::error::CallError;
use crate::host::Host;

/// Unsigned 32-bit addition modulo 2^32. Overflow is not an error.
#[inline]
pub fn add_wrapping(a: u32, b: u32) -> u32 {
    a.wrapping_add(b)
}

/// `sum([a, b]) -> a + b`. Registered as both `sum` and `csum`.
pub fn sum(host: &mut dyn Host, args: &[u8]) -> Result<(), CallError> {
    let (a, b) = codec::decode_pair(args)?;
    let mut out = ResultBuf::new();
    let mp = codec::encode_uint(&mut out, u64::from(add_wrapping(a, b)))?;
    host.return_mp(mp)
}

/// `echo(args) -> args`, byte for byte. The buffer is not decoded.
pub fn echo(host: &mut dyn Host, args: &[u8]) -> Result<(), CallError> {
    host.return_mp(args)
}
