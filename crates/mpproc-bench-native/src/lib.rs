//! `bench_procedures` module: `csum`, the benchmark build of `sum`.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};

use mpproc_core::registry::CSUM;
use mpproc_native_core::{box_function_ctx_t, invoke};

#[no_mangle]
pub unsafe extern "C" fn csum(
    ctx: *mut box_function_ctx_t,
    args: *const c_char,
    args_end: *const c_char,
) -> c_int {
    invoke(&CSUM, ctx, args, args_end)
}
