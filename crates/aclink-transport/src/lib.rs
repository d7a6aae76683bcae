//! aclink-transport: physical-link implementations for aclink.
//!
//! The protocol engine consumes the [`Transport`](aclink_core::Transport)
//! trait; this crate provides the production implementation over a
//! serial port. The S21 link is a local point-to-point serial
//! connection, so there are no network transports here.

pub mod serial;

pub use serial::{DataBits, Parity, SerialConfig, SerialTransport, StopBits};
