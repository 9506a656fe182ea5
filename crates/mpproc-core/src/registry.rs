//! Name -> procedure table.
//!
//! The host resolves procedures by symbol name, optionally qualified with the
//! module it loaded them from (`procedures.sum`). A qualified name only
//! resolves against the library that exports it. The same operation may be
//! registered under several names; `csum` is `sum` in a second library.

use crate::error::CallError;
use crate::host::Host;
use crate::ops;

pub type ProcFn = fn(&mut dyn Host, &[u8]) -> Result<(), CallError>;

/// Shared library holding `sum` and `echo`.
pub const MODULE: &str = "procedures";
/// Shared library holding `csum`.
pub const BENCH_MODULE: &str = "bench_procedures";

#[derive(Debug, Clone, Copy)]
pub struct Procedure {
    pub name: &'static str,
    /// Library the procedure is exported from.
    pub module: &'static str,
    pub about: &'static str,
    pub run: ProcFn,
}

pub const SUM: Procedure = Procedure {
    name: "sum",
    module: MODULE,
    about: "sum of two unsigned 32-bit integers, wrapping on overflow",
    run: ops::sum,
};

pub const ECHO: Procedure = Procedure {
    name: "echo",
    module: MODULE,
    about: "returns the argument buffer unchanged",
    run: ops::echo,
};

pub const CSUM: Procedure = Procedure {
    name: "csum",
    module: BENCH_MODULE,
    about: "same as sum, exported by the benchmark library",
    run: ops::sum,
};

pub const PROCEDURES: &[Procedure] = &[SUM, ECHO, CSUM];

/// Resolves `name` or `module.name`. The module must be the one exporting the
/// procedure; names with more than one qualifier never resolve.
pub fn lookup(name: &str) -> Option<&'static Procedure> {
    match name.split_once('.') {
        None => PROCEDURES.iter().find(|p| p.name == name),
        Some((module, bare)) => PROCEDURES
            .iter()
            .find(|p| p.module == module && p.name == bare),
    }
}

impl Procedure {
    /// Runs the procedure, logging failures.
    pub fn invoke(&self, host: &mut dyn Host, args: &[u8]) -> Result<(), CallError> {
        tracing::debug!(procedure = self.name, args_len = args.len(), "call");
        (self.run)(host, args).map_err(|err| {
            tracing::warn!(
                procedure = self.name,
                code = err.host_code(),
                error = %err,
                "call failed"
            );
            err
        })
    }
}

/// Looks up `name` and runs it.
pub fn call(name: &str, host: &mut dyn Host, args: &[u8]) -> Result<(), CallError> {
    let Some(procedure) = lookup(name) else {
        tracing::warn!(procedure = name, "unknown procedure");
        return Err(CallError::UnknownProcedure(name.to_string()));
    };
    procedure.invoke(host, args)
}
