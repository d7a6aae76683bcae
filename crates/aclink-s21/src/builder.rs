//! S21Builder -- fluent builder for constructing [`S21Unit`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, timeout values, and retry policy before the
//! startup negotiation runs.
//!
//! # Example
//!
//! ```no_run
//! use aclink_s21::S21Builder;
//! use std::time::Duration;
//!
//! # async fn example() -> aclink_core::Result<()> {
//! let unit = S21Builder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .response_timeout(Duration::from_millis(500))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use aclink_core::error::{Error, Result};
use aclink_core::transport::Transport;

use crate::adapter::S21Unit;
use crate::engine::{EngineConfig, S21Engine};
use crate::variant::Variant;

/// Fluent builder for [`S21Unit`].
///
/// All configuration has protocol-appropriate defaults, so the simplest
/// usage is:
///
/// ```ignore
/// let unit = S21Builder::new()
///     .serial_port("/dev/ttyUSB0")
///     .build()
///     .await?;
/// ```
pub struct S21Builder {
    serial_port: Option<String>,
    config: EngineConfig,
    variant_override: Option<Variant>,
    negotiate: bool,
}

impl S21Builder {
    /// Create a builder with default timing and retry settings.
    pub fn new() -> Self {
        S21Builder {
            serial_port: None,
            config: EngineConfig::default(),
            variant_override: None,
            negotiate: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Set the overall wait for a reply frame (default: 300 ms).
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Set the inter-byte timeout within a frame (default: 50 ms).
    pub fn inter_byte_timeout(mut self, timeout: Duration) -> Self {
        self.config.inter_byte_timeout = timeout;
        self
    }

    /// Set the wait for the bare ACK/NAK byte (default: 100 ms).
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the maximum additional attempts per transaction (default: 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Enable or disable the startup command-discovery probe pass
    /// (default: enabled).
    pub fn discover_commands(mut self, enabled: bool) -> Self {
        self.config.discover_commands = enabled;
        self
    }

    /// Skip startup negotiation entirely (default: run it).
    ///
    /// The engine then stays on the unknown version and the basic
    /// command set until something triggers a reset.
    pub fn negotiate(mut self, enabled: bool) -> Self {
        self.negotiate = enabled;
        self
    }

    /// Force a specific protocol variant instead of detecting one.
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant_override = Some(variant);
        self
    }

    /// Build an [`S21Unit`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `aclink-test-harness`) and for advanced use
    /// cases where the caller manages the transport lifecycle directly.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<S21Unit> {
        let mut engine = S21Engine::new(transport, self.config);
        if self.negotiate {
            engine.initialize().await?;
        }
        if let Some(variant) = self.variant_override {
            engine.set_variant(variant);
        }
        Ok(S21Unit::new(engine))
    }

    /// Build an [`S21Unit`] over a serial port opened with the S21 line
    /// settings (2400 baud, 8 data bits, even parity, 2 stop bits).
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been
    /// called.
    pub async fn build(self) -> Result<S21Unit> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = aclink_transport::SerialTransport::open_s21(port).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for S21Builder {
    fn default() -> Self {
        Self::new()
    }
}
