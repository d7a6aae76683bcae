//! The `AcUnit` trait -- unified interface for air-conditioner backends.
//!
//! This trait is the primary API surface of aclink. The device layer
//! (thermostat logic, smart-home bridges) programs against `dyn AcUnit`
//! without needing to know which manufacturer's wire dialect is in use.
//!
//! No method panics or returns an exception-style error for ordinary
//! device trouble: transient link problems are retried inside the
//! backend and surface as an `Err` only once the retry budget is spent.
//! The most recent outcome is always queryable via
//! [`last_operation_ok`](AcUnit::last_operation_ok) and
//! [`last_error`](AcUnit::last_error).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AcStatus, FanSpeed, Mode, SwingAxis, TempRange};

/// Unified asynchronous interface for controlling a split-unit air
/// conditioner.
///
/// Methods that talk to the unit are `async` because the underlying
/// transport involves serial I/O with timeouts; capability queries
/// return cached negotiation results and are synchronous.
#[async_trait]
pub trait AcUnit: Send {
    /// Apply power, mode, target temperature, and fan speed in one
    /// combined set operation.
    ///
    /// Input validation happens before any bytes are transmitted;
    /// invalid parameters return
    /// [`Error::InvalidParameter`](crate::error::Error::InvalidParameter)
    /// with zero wire traffic.
    async fn set_state(
        &mut self,
        power: bool,
        mode: Mode,
        target_temp: f32,
        fan: FanSpeed,
    ) -> Result<()>;

    /// Change only the target temperature, keeping cached power, mode,
    /// and fan speed.
    ///
    /// When the cached power state is off, the new setpoint is accepted
    /// and cached without transmitting a frame, so a later power-on uses
    /// it. This mirrors remote-control behavior: the setpoint can be
    /// adjusted while the unit is off.
    async fn set_target_temp(&mut self, target_temp: f32) -> Result<()>;

    /// Query a full status snapshot from the unit.
    async fn query_status(&mut self) -> Result<AcStatus>;

    /// Query only the current room temperature in °C.
    async fn query_temperature(&mut self) -> Result<f32>;

    /// Read the swing state of one louver axis.
    async fn get_swing(&mut self, axis: SwingAxis) -> Result<bool>;

    /// Enable or disable louver sweep on one axis.
    async fn set_swing(&mut self, axis: SwingAxis, on: bool) -> Result<()>;

    /// Whether this backend can control swing on the given axis.
    fn swing_supported(&self, axis: SwingAxis) -> bool;

    /// Whether this backend can set a fixed louver angle.
    ///
    /// The S21 family cannot; backends for protocols that can would
    /// override this.
    fn swing_angle_supported(&self) -> bool {
        false
    }

    /// The operating modes this unit accepts.
    fn supported_modes(&self) -> &[Mode];

    /// The fan speeds this unit accepts.
    fn supported_fan_speeds(&self) -> &[FanSpeed];

    /// The settable target temperature range.
    fn temperature_range(&self) -> TempRange;

    /// Human-readable protocol name, e.g. `"S21"`.
    fn protocol_name(&self) -> &str;

    /// Negotiated protocol version as a display string, e.g. `"3.20"`.
    fn protocol_version(&self) -> String;

    /// Whether the most recent operation succeeded.
    fn last_operation_ok(&self) -> bool;

    /// Text of the most recent error, or an empty string after success.
    fn last_error(&self) -> &str;
}
