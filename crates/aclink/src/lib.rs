//! # aclink -- Serial-Link Control for Split Air Conditioners
//!
//! `aclink` is an asynchronous Rust library for controlling split-unit
//! air conditioners over their proprietary half-duplex serial service
//! protocol. It is designed for thermostat controllers, smart-home
//! bridges, and monitoring tools where reliable unit control over a
//! slow, noisy wire is essential.
//!
//! ## Quick Start
//!
//! Add `aclink` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! aclink = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a unit and read its status:
//!
//! ```no_run
//! use aclink::{AcUnit, FanSpeed, Mode};
//! use aclink::s21::S21Builder;
//!
//! #[tokio::main]
//! async fn main() -> aclink::Result<()> {
//!     let mut unit = S21Builder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     unit.set_state(true, Mode::Cool, 22.5, FanSpeed::Auto).await?;
//!     let status = unit.query_status().await?;
//!     println!("room: {:.1} °C, target: {:.1} °C",
//!              status.current_temp, status.target_temp);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                  | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | `aclink-core`          | Traits ([`AcUnit`], [`Transport`]), types, errors |
//! | `aclink-transport`     | Serial transport implementation              |
//! | `aclink-s21`           | S21 protocol engine and variant strategies   |
//! | `aclink-test-harness`  | Mock transport for deterministic tests       |
//! | **`aclink`**           | This facade crate -- re-exports everything   |
//!
//! The protocol driver implements the [`AcUnit`] trait, so application
//! code can work with `dyn AcUnit` and remain protocol-agnostic.
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                | Default |
//! |----------|----------------------------------------|---------|
//! | `s21`    | [`s21`] module (S21 protocol engine)   | yes     |
//! | `serial` | [`transport`] module (serial port)     | yes     |
//!
//! ## Reliability model
//!
//! Every transaction is wrapped in a bounded retry loop whose policy
//! depends on the failure class; sustained failure triggers an internal
//! recovery procedure (input flush, settle, health check) and, as a
//! last resort, a full re-negotiation. Callers observe only `Result`
//! values plus queryable status: link state, a 0-100 quality score, and
//! the last-error text. Nothing in this library is fatal to the host
//! process; the worst case is a "not connected" status until recovery
//! succeeds.

pub use aclink_core::*;

/// S21 protocol backend.
///
/// Provides [`S21Unit`](s21::S21Unit) and [`S21Builder`](s21::S21Builder)
/// for controlling units speaking the S21 service protocol, including
/// the manufacturer dialect variants.
#[cfg(feature = "s21")]
pub mod s21 {
    pub use aclink_s21::*;
}

/// Serial transport implementation.
///
/// Provides [`SerialTransport`](transport::SerialTransport) with the
/// S21 service-port line settings.
#[cfg(feature = "serial")]
pub mod transport {
    pub use aclink_transport::*;
}
