//! `procedures` module: `sum` and `echo` stored procedures.
//!
//! Built as a shared library the database loads on first call; the exported
//! symbol names are the procedure names.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};

use mpproc_core::registry::{ECHO, SUM};
use mpproc_native_core::{box_function_ctx_t, invoke};

/// `sum(a, b)`: unsigned 32-bit sum, wrapping on overflow.
#[no_mangle]
pub unsafe extern "C" fn sum(
    ctx: *mut box_function_ctx_t,
    args: *const c_char,
    args_end: *const c_char,
) -> c_int {
    invoke(&SUM, ctx, args, args_end)
}

/// `echo(...)`: returns the request arguments as is.
#[no_mangle]
pub unsafe extern "C" fn echo(
    ctx: *mut box_function_ctx_t,
    args: *const c_char,
    args_end: *const c_char,
) -> c_int {
    invoke(&ECHO, ctx, args, args_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpproc_core::error::ER_ILLEGAL_PARAMS;
    use mpproc_native_core::testing::call_entry;

    #[test]
    fn sum_entry_point() {
        let out = call_entry(sum, &[0x92, 0x01, 0x02]);
        assert_eq!(out.status, 0);
        assert_eq!(out.returned, vec![vec![0x03]]);
        assert!(out.errors.is_empty());

        let out = call_entry(sum, &[0x92, 0xce, 0xff, 0xff, 0xff, 0xff, 0x01]);
        assert_eq!(out.returned, vec![vec![0x00]]);
    }

    #[test]
    fn sum_entry_point_rejects_wrong_arity() {
        let out = call_entry(sum, &[0x91, 0x01]);
        assert_eq!(out.status, -1);
        assert!(out.returned.is_empty());
        assert_eq!(
            out.errors,
            vec![(ER_ILLEGAL_PARAMS, "expected 2 arguments, got 1".to_string())]
        );
    }

    #[test]
    fn echo_entry_point() {
        // ["abc", [], {1: nil}]
        let args = [0x93, 0xa3, b'a', b'b', b'c', 0x90, 0x81, 0x01, 0xc0];
        let out = call_entry(echo, &args);
        assert_eq!(out.status, 0);
        assert_eq!(out.returned, vec![args.to_vec()]);
    }
}
