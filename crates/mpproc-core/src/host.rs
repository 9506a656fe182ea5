use crate::error::CallError;

/// The host side of a call: where encoded results go.
///
/// A host adapter wraps its per-call context in an implementation of this
/// trait; the procedures never see the context itself.
pub trait Host {
    /// Hands one encoded MessagePack value back to the caller.
    ///
    /// `mp` is exactly the written extent. Implementations copy it; the
    /// procedure's buffer does not outlive the call.
    fn return_mp(&mut self, mp: &[u8]) -> Result<(), CallError>;
}

/// In-process host that records every returned value in order.
#[derive(Debug, Default, Clone)]
pub struct Capture {
    returned: Vec<Vec<u8>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returned(&self) -> &[Vec<u8>] {
        &self.returned
    }

    /// The single returned value, if exactly one was returned.
    pub fn single(&self) -> Option<&[u8]> {
        match self.returned.as_slice() {
            [only] => Some(only.as_slice()),
            _ => None,
        }
    }
}

impl Host for Capture {
    fn return_mp(&mut self, mp: &[u8]) -> Result<(), CallError> {
        self.returned.push(mp.to_vec());
        Ok(())
    }
}
