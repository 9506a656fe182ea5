//! MessagePack stored procedures, independent of the host ABI.
//!
//! A procedure takes the raw argument buffer the host hands it, decodes a
//! fixed-shape argument array, and returns encoded results through a [`Host`].
//! The native crates adapt this to the database's C calling convention; tests
//! and the CLI use [`Capture`] instead. [`iproto`] encodes the same calls for a
//! database reached over the network.

pub mod codec;
pub mod error;
pub mod host;
pub mod iproto;
pub mod ops;
pub mod registry;

pub use error::CallError;
pub use host::{Capture, Host};
pub use registry::{Procedure, PROCEDURES};
