//! aclink-s21: the S21 half-duplex serial protocol engine.
//!
//! Implements the proprietary byte protocol used between a controller
//! and a split-unit air conditioner's indoor board: frame codec with
//! checksums, multi-version negotiation, dynamic command discovery,
//! manufacturer variant adaptation, bounded retry with recovery, and
//! communication-quality monitoring.
//!
//! The public surface most callers want is [`S21Builder`] producing an
//! [`S21Unit`], which implements [`AcUnit`](aclink_core::AcUnit):
//!
//! ```no_run
//! use aclink_core::{AcUnit, FanSpeed, Mode};
//! use aclink_s21::S21Builder;
//!
//! # async fn example() -> aclink_core::Result<()> {
//! let mut unit = S21Builder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .build()
//!     .await?;
//!
//! unit.set_state(true, Mode::Cool, 22.5, FanSpeed::Auto).await?;
//! let status = unit.query_status().await?;
//! println!("room is at {:.1} °C", status.current_temp);
//! # Ok(())
//! # }
//! ```
//!
//! Lower layers are exported for diagnostics and testing:
//! [`S21Engine`] for raw command exchanges, [`frame`] for the codec,
//! [`sensors`] for the value codecs, and [`variant`] for the dialect
//! strategies.

pub mod adapter;
pub mod builder;
pub mod discovery;
pub mod engine;
pub mod frame;
pub mod quality;
pub mod sensors;
pub mod variant;
pub mod version;

pub use adapter::{S21Unit, SUPPORTED_FAN_SPEEDS, SUPPORTED_MODES, TEMP_RANGE};
pub use builder::S21Builder;
pub use engine::{EngineConfig, S21Engine};
pub use frame::S21Frame;
pub use quality::{CommunicationQuality, ErrorRecoveryState, LinkStatus};
pub use variant::{Variant, VariantDetector, VariantInfo, VariantStrategy};
pub use version::{Features, ProtocolVersion};
