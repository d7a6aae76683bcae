//! The S21 capability façade: [`AcUnit`] over an [`S21Engine`].
//!
//! Translates capability-level requests into wire exchanges, validating
//! every input against the static supported-value tables before any
//! byte leaves the transport. Keeps a cached last-known status so that
//! "set temperature while off" behaves the way users expect from a
//! remote control: accepted, cached, and applied at the next power-on,
//! with zero protocol traffic.

use async_trait::async_trait;
use tracing::debug;

use aclink_core::unit::AcUnit;
use aclink_core::{AcStatus, Error, FanSpeed, Mode, Result, SwingAxis, SwingState, TempRange};

use crate::engine::S21Engine;
use crate::frame::S21Frame;
use crate::sensors;

/// Operating modes the S21 family accepts.
pub const SUPPORTED_MODES: [Mode; 5] = [Mode::Auto, Mode::Cool, Mode::Heat, Mode::Dry, Mode::Fan];

/// Fan speeds the S21 family accepts.
pub const SUPPORTED_FAN_SPEEDS: [FanSpeed; 7] = [
    FanSpeed::Auto,
    FanSpeed::Quiet,
    FanSpeed::Level1,
    FanSpeed::Level2,
    FanSpeed::Level3,
    FanSpeed::Level4,
    FanSpeed::Level5,
];

/// Settable target range of the S21 family.
pub const TEMP_RANGE: TempRange = TempRange {
    min: 16.0,
    max: 30.0,
};

/// [`AcUnit`] implementation speaking S21 through an [`S21Engine`].
pub struct S21Unit {
    engine: S21Engine,
    cached: AcStatus,
    last_ok: bool,
    last_error: String,
}

impl std::fmt::Debug for S21Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S21Unit")
            .field("cached", &self.cached)
            .field("last_ok", &self.last_ok)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl S21Unit {
    /// Wrap an engine. The engine should already be initialized (the
    /// builder does this); an uninitialized engine still works on the
    /// basic command set.
    pub fn new(engine: S21Engine) -> Self {
        S21Unit {
            engine,
            cached: AcStatus::default(),
            last_ok: false,
            last_error: String::new(),
        }
    }

    /// Access the underlying engine (diagnostics, quality metrics).
    pub fn engine(&self) -> &S21Engine {
        &self.engine
    }

    /// Mutable access to the underlying engine.
    pub fn engine_mut(&mut self) -> &mut S21Engine {
        &mut self.engine
    }

    /// The cached last-known status (may be `!valid` before the first
    /// successful exchange).
    pub fn cached_status(&self) -> &AcStatus {
        &self.cached
    }

    fn note<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.last_ok = true;
                self.last_error.clear();
            }
            Err(e) => {
                self.last_ok = false;
                self.last_error = e.to_string();
            }
        }
        result
    }

    fn validate_temperature(&self, temp: f32) -> Result<()> {
        if !temp.is_finite() || !TEMP_RANGE.contains(temp) {
            return Err(Error::InvalidParameter(format!(
                "target temperature {temp} outside {}",
                TEMP_RANGE
            )));
        }
        Ok(())
    }

    fn validate_mode(&self, mode: Mode) -> Result<()> {
        if !SUPPORTED_MODES.contains(&mode) {
            return Err(Error::InvalidParameter(format!("unsupported mode {mode}")));
        }
        Ok(())
    }

    fn validate_fan(&self, fan: FanSpeed) -> Result<()> {
        if !SUPPORTED_FAN_SPEEDS.contains(&fan) {
            return Err(Error::InvalidParameter(format!(
                "unsupported fan speed {fan}"
            )));
        }
        Ok(())
    }

    /// Build the combined `D1` set payload: power flag, mode digit,
    /// variant-encoded setpoint, fan byte.
    fn build_set_payload(&self, power: bool, mode: Mode, temp: f32, fan: FanSpeed) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(4);
        payload.push(if power { b'1' } else { b'0' });
        payload.push(b'0' + mode.wire_value());
        payload.extend(self.engine.strategy().encode_temperature(temp)?);
        payload.push(fan.wire_value());
        Ok(payload)
    }

    /// Parse a `G1` status reply into the snapshot form.
    fn parse_status_reply(&self, reply: &S21Frame) -> Result<AcStatus> {
        if reply.cmd0 != b'G' || reply.cmd1 != b'1' || reply.payload.len() < 4 {
            return Err(Error::InvalidResponse(format!(
                "expected G1 status reply, got {}{} ({} payload bytes)",
                reply.cmd0 as char,
                reply.cmd1 as char,
                reply.payload.len()
            )));
        }
        let payload = &reply.payload;
        let power = match payload[0] {
            b'0' => false,
            b'1' => true,
            other => {
                return Err(Error::InvalidResponse(format!(
                    "bad power byte 0x{other:02X}"
                )))
            }
        };
        let mode = payload[1]
            .checked_sub(b'0')
            .and_then(Mode::from_wire)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("bad mode byte 0x{:02X}", payload[1]))
            })?;
        // The setpoint field is everything between the mode digit and
        // the trailing fan byte; its width follows the active variant's
        // temperature format.
        let temp_bytes = &payload[2..payload.len() - 1];
        let target_temp = self.engine.strategy().decode_temperature(temp_bytes)?;
        let fan_speed = FanSpeed::from_wire(payload[payload.len() - 1]).ok_or_else(|| {
            Error::InvalidResponse(format!(
                "bad fan byte 0x{:02X}",
                payload[payload.len() - 1]
            ))
        })?;

        Ok(AcStatus {
            power,
            mode,
            target_temp,
            current_temp: self.cached.current_temp,
            fan_speed,
            swing: self.cached.swing,
            valid: true,
        })
    }

    async fn query_swing_state(&mut self) -> Result<SwingState> {
        let reply = self.engine.command(b'F', b'5', &[]).await?;
        if reply.cmd0 != b'G' || reply.cmd1 != b'5' || reply.payload.is_empty() {
            return Err(Error::InvalidResponse(format!(
                "expected G5 swing reply, got {}{}",
                reply.cmd0 as char, reply.cmd1 as char
            )));
        }
        let nibble = reply.payload[0].wrapping_sub(b'0');
        Ok(SwingState::from_nibble(nibble))
    }
}

#[async_trait]
impl AcUnit for S21Unit {
    async fn set_state(
        &mut self,
        power: bool,
        mode: Mode,
        target_temp: f32,
        fan: FanSpeed,
    ) -> Result<()> {
        let result = async {
            self.validate_temperature(target_temp)?;
            self.validate_mode(mode)?;
            self.validate_fan(fan)?;

            let payload = self.build_set_payload(power, mode, target_temp, fan)?;
            self.engine.set_command(b'D', b'1', &payload).await?;

            self.cached.power = power;
            self.cached.mode = mode;
            self.cached.target_temp = target_temp;
            self.cached.fan_speed = fan;
            self.cached.valid = true;
            debug!(power, %mode, target_temp, %fan, "applied combined set");
            Ok(())
        }
        .await;
        self.note(result)
    }

    async fn set_target_temp(&mut self, target_temp: f32) -> Result<()> {
        let result = async {
            self.validate_temperature(target_temp)?;

            // Setpoint changes while the unit is off are cached without
            // any wire traffic and applied at the next power-on.
            if !self.cached.power {
                self.cached.target_temp = target_temp;
                debug!(target_temp, "unit off, cached setpoint without transmitting");
                return Ok(());
            }

            let payload = self.build_set_payload(
                true,
                self.cached.mode,
                target_temp,
                self.cached.fan_speed,
            )?;
            self.engine.set_command(b'D', b'1', &payload).await?;
            self.cached.target_temp = target_temp;
            Ok(())
        }
        .await;
        self.note(result)
    }

    async fn query_status(&mut self) -> Result<AcStatus> {
        let result = async {
            let reply = self.engine.command(b'F', b'1', &[]).await?;
            let status = self.parse_status_reply(&reply)?;
            self.cached = status;
            Ok(status)
        }
        .await;
        self.note(result)
    }

    async fn query_temperature(&mut self) -> Result<f32> {
        let result = async {
            let reply = self.engine.command(b'R', b'H', &[]).await?;
            if reply.cmd0 != b'S' || reply.cmd1 != b'H' || reply.payload.len() < 4 {
                return Err(Error::InvalidResponse(format!(
                    "expected SH temperature reply, got {}{}",
                    reply.cmd0 as char, reply.cmd1 as char
                )));
            }
            let temp = sensors::decode_float_sensor(&reply.payload)?;
            if !sensors::valid_temperature(temp) {
                return Err(Error::InvalidResponse(format!(
                    "implausible room temperature {temp}"
                )));
            }
            self.cached.current_temp = temp;
            Ok(temp)
        }
        .await;
        self.note(result)
    }

    async fn get_swing(&mut self, axis: SwingAxis) -> Result<bool> {
        let result = async {
            if !self.swing_supported(axis) {
                return Err(Error::CommandNotSupported(format!("{axis} swing")));
            }
            let swing = self.query_swing_state().await?;
            self.cached.swing = swing;
            Ok(swing.axis(axis))
        }
        .await;
        self.note(result)
    }

    async fn set_swing(&mut self, axis: SwingAxis, on: bool) -> Result<()> {
        let result = async {
            if !self.swing_supported(axis) {
                return Err(Error::CommandNotSupported(format!("{axis} swing")));
            }
            let desired = self.cached.swing.with_axis(axis, on);
            let payload = [
                b'0' + desired.to_nibble(),
                if desired.any() { b'?' } else { b'0' },
                b'0',
                0x80,
            ];
            self.engine.set_command(b'D', b'5', &payload).await?;

            // Re-query so the cache reflects what the unit actually did.
            let confirmed = self.query_swing_state().await?;
            self.cached.swing = confirmed;
            Ok(())
        }
        .await;
        self.note(result)
    }

    fn swing_supported(&self, axis: SwingAxis) -> bool {
        if !self.engine.is_command_supported(b'F', b'5') {
            return false;
        }
        let features = self.engine.features();
        match axis {
            // Vertical swing is assumed present unless a capability
            // query explicitly said otherwise.
            SwingAxis::Vertical => features.swing || !self.engine.features_refined(),
            SwingAxis::Horizontal => features.horizontal_swing,
        }
    }

    fn supported_modes(&self) -> &[Mode] {
        &SUPPORTED_MODES
    }

    fn supported_fan_speeds(&self) -> &[FanSpeed] {
        &SUPPORTED_FAN_SPEEDS
    }

    fn temperature_range(&self) -> TempRange {
        TEMP_RANGE
    }

    fn protocol_name(&self) -> &str {
        "S21"
    }

    fn protocol_version(&self) -> String {
        self.engine.version().to_string()
    }

    fn last_operation_ok(&self) -> bool {
        self.last_ok
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }
}
