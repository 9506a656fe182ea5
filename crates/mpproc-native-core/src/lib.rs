//! Glue between the database's C module API and `mpproc-core` procedures.
//!
//! The database calls every stored procedure as
//! `int f(box_function_ctx_t *ctx, const char *args, const char *args_end)`.
//! Results go back through `box_return_mp`; failures are reported with
//! `box_error_set` and a `-1` status so the caller gets an error reply and the
//! server keeps running.

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int, CString};
use std::panic::{self, AssertUnwindSafe};

use mpproc_core::{CallError, Host, Procedure};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Opaque per-call context owned by the database.
#[repr(C)]
pub struct box_function_ctx_t {
    _private: [u8; 0],
}

extern "C" {
    fn box_return_mp(
        ctx: *mut box_function_ctx_t,
        mp: *const c_char,
        mp_end: *const c_char,
    ) -> c_int;
    // Test builds record errors in Rust instead; see `report_error`.
    #[cfg(not(any(test, feature = "testing")))]
    fn box_error_set(
        file: *const c_char,
        line: std::ffi::c_uint,
        code: u32,
        format: *const c_char,
        ...
    ) -> c_int;
}

/// [`Host`] backed by a live call context.
pub struct BoxHost {
    ctx: *mut box_function_ctx_t,
}

impl BoxHost {
    /// `ctx` must be the context of the call currently executing.
    pub unsafe fn new(ctx: *mut box_function_ctx_t) -> Self {
        Self { ctx }
    }
}

impl Host for BoxHost {
    fn return_mp(&mut self, mp: &[u8]) -> Result<(), CallError> {
        let range = mp.as_ptr_range();
        let rc = unsafe { box_return_mp(self.ctx, range.start.cast(), range.end.cast()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(CallError::Host(rc))
        }
    }
}

/// Borrows the argument range `[args, args_end)`.
///
/// Null or inverted ranges are rejected rather than dereferenced.
pub unsafe fn args_slice<'a>(
    args: *const c_char,
    args_end: *const c_char,
) -> Result<&'a [u8], CallError> {
    if args.is_null() || args_end.is_null() {
        return Err(CallError::malformed("null argument buffer"));
    }
    let len = (args_end as usize)
        .checked_sub(args as usize)
        .ok_or_else(|| CallError::malformed("argument buffer ends before it starts"))?;
    Ok(std::slice::from_raw_parts(args.cast::<u8>(), len))
}

/// The error text as a C string, with interior NULs escaped.
fn error_message(err: &CallError) -> CString {
    CString::new(err.to_string().replace('\0', "\\0")).unwrap_or_default()
}

#[cfg(not(any(test, feature = "testing")))]
fn report_error(code: u32, msg: &CString) {
    unsafe {
        box_error_set(
            concat!(file!(), "\0").as_ptr().cast(),
            line!(),
            code,
            b"%s\0".as_ptr().cast(),
            msg.as_ptr(),
        );
    }
}

// `box_error_set` is C-variadic, which a Rust stand-in cannot define portably.
#[cfg(any(test, feature = "testing"))]
fn report_error(code: u32, msg: &CString) {
    testing::record_error(code, msg);
}

/// Sets the call's error in the database diagnostics area and returns `-1`.
pub fn set_error(err: &CallError) -> c_int {
    report_error(err.host_code(), &error_message(err));
    -1
}

/// Runs `procedure` for one database call and converts the outcome to a status.
pub unsafe fn invoke(
    procedure: &Procedure,
    ctx: *mut box_function_ctx_t,
    args: *const c_char,
    args_end: *const c_char,
) -> c_int {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let args = unsafe { args_slice(args, args_end) }?;
        let mut host = unsafe { BoxHost::new(ctx) };
        procedure.invoke(&mut host, args)
    }))
    .unwrap_or_else(|_| {
        tracing::error!(procedure = procedure.name, "procedure panicked");
        Err(CallError::Panicked)
    });

    match outcome {
        Ok(()) => 0,
        Err(err) => set_error(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{call, StubOutcome};
    use mpproc_core::error::{ER_ILLEGAL_PARAMS, ER_INVALID_MSGPACK, ER_PROC_C};
    use mpproc_core::registry::{ECHO, SUM};
    use mpproc_core::ops;

    #[test]
    fn success_returns_exact_extent() {
        let out = call(&SUM, &[0x92, 0xcc, 0xc8, 0x64]);
        assert_eq!(
            out,
            StubOutcome {
                status: 0,
                returned: vec![vec![0xcd, 0x01, 0x2c]],
                errors: vec![],
            }
        );
    }

    #[test]
    fn shape_violation_is_reported_not_fatal() {
        let out = call(&SUM, &[0x93, 0x01, 0x02, 0x03]);
        assert_eq!(out.status, -1);
        assert!(out.returned.is_empty());
        assert_eq!(
            out.errors,
            vec![(ER_ILLEGAL_PARAMS, "expected 2 arguments, got 3".to_string())]
        );
    }

    #[test]
    fn truncated_args_report_invalid_msgpack() {
        let out = call(&SUM, &[0x92, 0x01]);
        assert_eq!(out.status, -1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].0, ER_INVALID_MSGPACK);
    }

    #[test]
    fn echo_forwards_original_range() {
        let args = [0x93, 0xa1, b'a', 0xc0, 0x90];
        let out = call(&ECHO, &args);
        assert_eq!(out.status, 0);
        assert_eq!(out.returned, vec![args.to_vec()]);
    }

    #[test]
    fn null_range_is_rejected() {
        let err = unsafe { args_slice(std::ptr::null(), std::ptr::null()) }.unwrap_err();
        assert!(matches!(err, CallError::Malformed(_)));

        let buf = [0u8; 4];
        let start = buf.as_ptr().cast::<c_char>();
        let end = unsafe { start.add(2) };
        let err = unsafe { args_slice(end, start) }.unwrap_err();
        assert!(matches!(err, CallError::Malformed(_)));
        assert_eq!(unsafe { args_slice(start, end) }.unwrap(), &buf[..2]);
    }

    #[test]
    fn host_rejection_becomes_proc_error() {
        let out = crate::testing::call_with_return_status(&SUM, &[0x92, 0x01, 0x01], 1);
        assert_eq!(out.status, -1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].0, ER_PROC_C);
        assert!(out.errors[0].1.contains("status 1"));
    }

    #[test]
    fn error_text_survives_interior_nul() {
        let err = CallError::malformed("a\0b");
        assert_eq!(error_message(&err).to_str().unwrap(), "invalid MsgPack: a\\0b");

        let out = call(&SUM, &[0x91, 0x00]);
        assert_eq!(out.status, -1);
        assert_eq!(
            out.errors,
            vec![(ER_ILLEGAL_PARAMS, "expected 2 arguments, got 1".to_string())]
        );
    }

    fn boom(_: &mut dyn Host, _: &[u8]) -> Result<(), CallError> {
        panic!("boom")
    }

    #[test]
    fn panic_is_contained() {
        let proc_ = Procedure {
            name: "boom",
            module: "test",
            about: "",
            run: boom,
        };
        let out = call(&proc_, &[0x90]);
        assert_eq!(out.status, -1);
        assert_eq!(out.errors, vec![(ER_PROC_C, "procedure panicked".to_string())]);

        // Unrelated procedures are unaffected afterwards.
        let sum = Procedure {
            name: "sum",
            module: "test",
            about: "",
            run: ops::sum,
        };
        assert_eq!(call(&sum, &[0x92, 0x00, 0x00]).status, 0);
    }
}
