//! aclink-core: Core traits, types, and error definitions for aclink.
//!
//! This crate defines the manufacturer-agnostic abstractions that all
//! aclink backends implement. Device layers and automation tools depend
//! on these types without pulling in any specific protocol driver.
//!
//! # Key types
//!
//! - [`AcUnit`] -- the unified trait for controlling any unit
//! - [`Transport`] -- byte-level communication channel
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod helpers;
pub mod transport;
pub mod types;
pub mod unit;

// Re-export key types at crate root for ergonomic `use aclink_core::*`.
pub use error::{Error, ErrorKind, Result};
pub use helpers::{format_protocol_version, format_temp};
pub use transport::Transport;
pub use types::*;
pub use unit::AcUnit;
