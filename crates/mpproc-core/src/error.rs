use std::fmt;

// Host error codes (box.error numbering).
pub const ER_ILLEGAL_PARAMS: u32 = 1;
pub const ER_INVALID_MSGPACK: u32 = 20;
pub const ER_PROC_C: u32 = 102;

/// Failure of a single procedure call.
///
/// Every variant is local to the call that produced it; the host adapter turns
/// it into an error reply instead of terminating the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The argument array has the wrong number of elements.
    ArgumentCount { expected: u32, actual: u32 },
    /// The argument buffer does not start with an array header.
    NotAnArray { found: String },
    /// Argument `index` has the wrong type or does not fit the operand width.
    ArgumentType { index: u32, found: String },
    /// Truncated or otherwise undecodable input.
    Malformed(String),
    /// The encoded result does not fit the result buffer.
    ResultOverflow,
    UnknownProcedure(String),
    /// The host rejected the returned buffer with a nonzero status.
    Host(i32),
    Panicked,
    /// Error reply from a remote database, with its own error code.
    Remote { code: u32, message: String },
}

impl CallError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CallError::Malformed(reason.into())
    }

    /// Error code reported to the host alongside the message.
    pub fn host_code(&self) -> u32 {
        match self {
            CallError::ArgumentCount { .. }
            | CallError::NotAnArray { .. }
            | CallError::ArgumentType { .. } => ER_ILLEGAL_PARAMS,
            CallError::Malformed(_) => ER_INVALID_MSGPACK,
            CallError::ResultOverflow
            | CallError::UnknownProcedure(_)
            | CallError::Host(_)
            | CallError::Panicked => ER_PROC_C,
            CallError::Remote { code, .. } => *code,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::ArgumentCount { expected, actual } => write!(
                f,
                "expected {expected} arguments, got {actual}"
            ),
            CallError::NotAnArray { found } => {
                write!(f, "arguments must be an array, got {found}")
            }
            CallError::ArgumentType { index, found } => write!(
                f,
                "argument #{} must be an unsigned 32-bit integer, got {found}",
                index + 1
            ),
            CallError::Malformed(reason) => write!(f, "invalid MsgPack: {reason}"),
            CallError::ResultOverflow => f.write_str("result does not fit the result buffer"),
            CallError::UnknownProcedure(name) => write!(f, "unknown procedure {name:?}"),
            CallError::Host(status) => write!(f, "host rejected result (status {status})"),
            CallError::Panicked => f.write_str("procedure panicked"),
            CallError::Remote { code, message } => write!(f, "server error {code}: {message}"),
        }
    }
}

impl std::error::Error for CallError {}
