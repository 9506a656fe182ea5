//! Stub `box_return_mp` and an error recorder for running the native entry
//! points in a plain test binary.
//!
//! State is thread-local, so tests running in parallel do not see each other's
//! results.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_int, CStr};
use std::ptr::NonNull;

use mpproc_core::Procedure;

use crate::box_function_ctx_t;

thread_local! {
    static RETURNED: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
    static ERRORS: RefCell<Vec<(u32, String)>> = const { RefCell::new(Vec::new()) };
    static RETURN_STATUS: Cell<c_int> = const { Cell::new(0) };
}

#[no_mangle]
extern "C" fn box_return_mp(
    _ctx: *mut box_function_ctx_t,
    mp: *const c_char,
    mp_end: *const c_char,
) -> c_int {
    let status = RETURN_STATUS.with(Cell::get);
    if status != 0 {
        return status;
    }
    let len = mp_end as usize - mp as usize;
    let bytes = unsafe { std::slice::from_raw_parts(mp.cast::<u8>(), len) }.to_vec();
    RETURNED.with(|r| r.borrow_mut().push(bytes));
    0
}

/// Takes the place of `box_error_set` in test builds.
pub(crate) fn record_error(code: u32, msg: &CStr) {
    let msg = msg.to_string_lossy().into_owned();
    ERRORS.with(|e| e.borrow_mut().push((code, msg)));
}

/// What one stubbed call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubOutcome {
    pub status: c_int,
    pub returned: Vec<Vec<u8>>,
    pub errors: Vec<(u32, String)>,
}

fn with_stub_host(
    return_status: c_int,
    args: &[u8],
    f: impl FnOnce(*mut box_function_ctx_t, *const c_char, *const c_char) -> c_int,
) -> StubOutcome {
    RETURNED.with(|r| r.borrow_mut().clear());
    ERRORS.with(|e| e.borrow_mut().clear());
    RETURN_STATUS.with(|s| s.set(return_status));

    let ctx = NonNull::<box_function_ctx_t>::dangling().as_ptr();
    let range = args.as_ptr_range();
    let status = f(ctx, range.start.cast(), range.end.cast());

    RETURN_STATUS.with(|s| s.set(0));
    StubOutcome {
        status,
        returned: RETURNED.with(|r| r.take()),
        errors: ERRORS.with(|e| e.take()),
    }
}

/// Drives an exported entry point the way the database would.
pub fn call_entry(
    entry: unsafe extern "C" fn(*mut box_function_ctx_t, *const c_char, *const c_char) -> c_int,
    args: &[u8],
) -> StubOutcome {
    with_stub_host(0, args, |ctx, start, end| unsafe { entry(ctx, start, end) })
}

/// Runs `procedure` through [`crate::invoke`] against the stub host.
pub fn call(procedure: &Procedure, args: &[u8]) -> StubOutcome {
    call_with_return_status(procedure, args, 0)
}

/// Like [`call`], with `box_return_mp` failing with `return_status` when nonzero.
pub fn call_with_return_status(
    procedure: &Procedure,
    args: &[u8],
    return_status: c_int,
) -> StubOutcome {
    with_stub_host(return_status, args, |ctx, start, end| unsafe {
        crate::invoke(procedure, ctx, start, end)
    })
}
