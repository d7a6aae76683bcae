//! Sensor value encoding and decoding.
//!
//! A library of small, pure codecs for the value formats found in S21
//! payloads and its manufacturer dialects: the one-character offset
//! temperature, ASCII-digit sensor readings, hex-nibble counters, BCD
//! bytes, raw little/big-endian integers, and fixed-point scalings.
//! Variant strategies pick between formats with the
//! [`TemperatureFormat`] / [`HumidityFormat`] tags.
//!
//! Also contains plausibility validators and two noise-handling helpers
//! used by callers polling real sensors: a rate-of-change clamp and a
//! rolling stability window.

use std::collections::VecDeque;
use std::time::Duration;

use aclink_core::{Error, Result};

/// Wire byte encoding the minimum target temperature (18.0 °C).
pub const MIN_TEMP_CHAR: u8 = b'@';

/// Baseline of the one-character target temperature encoding, °C.
pub const TEMP_BASE: f32 = 18.0;

/// Step of the one-character target temperature encoding, °C.
pub const TEMP_STEP: f32 = 0.5;

// ---------------------------------------------------------------------------
// Target temperature (one-character offset encoding)
// ---------------------------------------------------------------------------

/// Decode a one-character target temperature.
///
/// `'@'` is 18.0 °C; each step is 0.5 °C, and values below `'@'` are
/// legal (16.0 °C encodes as `'<'`).
///
/// # Example
///
/// ```
/// use aclink_s21::sensors::decode_target_temp;
///
/// assert_eq!(decode_target_temp(b'@'), 18.0);
/// assert_eq!(decode_target_temp(b'I'), 22.5);
/// ```
pub fn decode_target_temp(v: u8) -> f32 {
    TEMP_BASE + TEMP_STEP * (v as i16 - MIN_TEMP_CHAR as i16) as f32
}

/// Encode a target temperature as the one-character offset form,
/// rounding to the nearest 0.5 °C step.
pub fn encode_target_temp(temp: f32) -> u8 {
    let steps = ((temp - TEMP_BASE) * 2.0).round() as i16;
    (MIN_TEMP_CHAR as i16 + steps) as u8
}

// ---------------------------------------------------------------------------
// ASCII-digit sensor values
// ---------------------------------------------------------------------------

/// Decode a 4-byte ASCII sensor payload: three decimal digits, least
/// significant first, followed by a sign byte.
///
/// # Example
///
/// ```
/// use aclink_s21::sensors::decode_int_sensor;
///
/// // 23.5 °C is transmitted as "532+" (value 235, tenths of a degree)
/// assert_eq!(decode_int_sensor(b"532+").unwrap(), 235);
/// assert_eq!(decode_int_sensor(b"550-").unwrap(), -55);
/// ```
pub fn decode_int_sensor(payload: &[u8]) -> Result<i32> {
    if payload.len() < 4 {
        return Err(Error::InvalidResponse(format!(
            "sensor payload too short: {} bytes",
            payload.len()
        )));
    }
    for &b in &payload[..3] {
        if !b.is_ascii_digit() {
            return Err(Error::InvalidResponse(format!(
                "non-digit 0x{b:02X} in sensor payload"
            )));
        }
    }
    let v = (payload[0] - b'0') as i32
        + (payload[1] - b'0') as i32 * 10
        + (payload[2] - b'0') as i32 * 100;
    match payload[3] {
        b'-' => Ok(-v),
        b'+' => Ok(v),
        other => Err(Error::InvalidResponse(format!(
            "bad sensor sign byte 0x{other:02X}"
        ))),
    }
}

/// Encode an integer sensor value into the 4-byte ASCII form.
///
/// Inverse of [`decode_int_sensor`] for magnitudes up to 999.
pub fn encode_int_sensor(value: i32) -> Result<[u8; 4]> {
    let magnitude = value.unsigned_abs();
    if magnitude > 999 {
        return Err(Error::InvalidParameter(format!(
            "sensor value {value} out of range"
        )));
    }
    Ok([
        b'0' + (magnitude % 10) as u8,
        b'0' + (magnitude / 10 % 10) as u8,
        b'0' + (magnitude / 100) as u8,
        if value < 0 { b'-' } else { b'+' },
    ])
}

/// Decode an ASCII sensor payload carrying tenths of a unit.
pub fn decode_float_sensor(payload: &[u8]) -> Result<f32> {
    Ok(decode_int_sensor(payload)? as f32 * 0.1)
}

// ---------------------------------------------------------------------------
// Hex-nibble sensor values
// ---------------------------------------------------------------------------

/// Decode a 4-character hex sensor payload, least significant nibble
/// first (used by the power-consumption counter, 100 Wh units).
pub fn decode_hex_sensor(payload: &[u8]) -> Result<u16> {
    if payload.len() < 4 {
        return Err(Error::InvalidResponse(format!(
            "hex sensor payload too short: {} bytes",
            payload.len()
        )));
    }
    let mut value: u16 = 0;
    for (i, &b) in payload[..4].iter().enumerate() {
        let nibble = match b {
            b'0'..=b'9' => b - b'0',
            b'A'..=b'F' => b - b'A' + 10,
            b'a'..=b'f' => b - b'a' + 10,
            other => {
                return Err(Error::InvalidResponse(format!(
                    "bad hex digit 0x{other:02X} in sensor payload"
                )))
            }
        };
        value |= (nibble as u16) << (4 * i);
    }
    Ok(value)
}

/// Encode a `u16` as the 4-character hex sensor form, least significant
/// nibble first.
pub fn encode_hex_sensor(value: u16) -> [u8; 4] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    [
        HEX[(value & 0xF) as usize],
        HEX[(value >> 4 & 0xF) as usize],
        HEX[(value >> 8 & 0xF) as usize],
        HEX[(value >> 12 & 0xF) as usize],
    ]
}

// ---------------------------------------------------------------------------
// BCD and raw integers
// ---------------------------------------------------------------------------

/// Decode a packed BCD byte (two decimal digits).
pub fn bcd_decode(byte: u8) -> Result<u8> {
    let hi = byte >> 4;
    let lo = byte & 0x0F;
    if hi > 9 || lo > 9 {
        return Err(Error::InvalidResponse(format!(
            "invalid BCD byte 0x{byte:02X}"
        )));
    }
    Ok(hi * 10 + lo)
}

/// Encode a value 0..=99 as a packed BCD byte.
pub fn bcd_encode(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(Error::InvalidParameter(format!(
            "value {value} not BCD-encodable"
        )));
    }
    Ok((value / 10) << 4 | (value % 10))
}

/// Decode a little-endian `u16` from the first two payload bytes.
pub fn decode_u16_le(payload: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = payload
        .get(..2)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidResponse("u16 payload too short".into()))?;
    Ok(u16::from_le_bytes(bytes))
}

/// Decode a big-endian `u16` from the first two payload bytes.
pub fn decode_u16_be(payload: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = payload
        .get(..2)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidResponse("u16 payload too short".into()))?;
    Ok(u16::from_be_bytes(bytes))
}

/// Decode a little-endian `u32` from the first four payload bytes.
pub fn decode_u32_le(payload: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidResponse("u32 payload too short".into()))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Decode a big-endian `u32` from the first four payload bytes.
pub fn decode_u32_be(payload: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidResponse("u32 payload too short".into()))?;
    Ok(u32::from_be_bytes(bytes))
}

/// Scale a raw fixed-point value in tenths.
pub fn fixed_point_deci(raw: i32) -> f32 {
    raw as f32 * 0.1
}

/// Scale a raw fixed-point value in hundredths.
pub fn fixed_point_centi(raw: i32) -> f32 {
    raw as f32 * 0.01
}

// ---------------------------------------------------------------------------
// Multi-format temperature / humidity
// ---------------------------------------------------------------------------

/// Temperature wire format tag, as carried in a variant's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureFormat {
    /// One-character offset encoding ('@' = 18.0 °C, 0.5 °C steps).
    OffsetChar = 0,
    /// One packed BCD byte of whole degrees.
    Bcd = 1,
    /// Signed 16-bit little-endian hundredths of a degree.
    SignedCenti = 2,
}

/// Decode a temperature according to the given format tag.
pub fn decode_temperature(payload: &[u8], format: TemperatureFormat) -> Result<f32> {
    match format {
        TemperatureFormat::OffsetChar => {
            let &b = payload
                .first()
                .ok_or(Error::InvalidResponse("empty temperature payload".into()))?;
            Ok(decode_target_temp(b))
        }
        TemperatureFormat::Bcd => {
            let &b = payload
                .first()
                .ok_or(Error::InvalidResponse("empty temperature payload".into()))?;
            Ok(bcd_decode(b)? as f32)
        }
        TemperatureFormat::SignedCenti => {
            let raw = decode_u16_le(payload)? as i16;
            Ok(fixed_point_centi(raw as i32))
        }
    }
}

/// Encode a temperature according to the given format tag.
pub fn encode_temperature(temp: f32, format: TemperatureFormat) -> Result<Vec<u8>> {
    match format {
        TemperatureFormat::OffsetChar => Ok(vec![encode_target_temp(temp)]),
        TemperatureFormat::Bcd => {
            let whole = temp.round();
            if !(0.0..=99.0).contains(&whole) {
                return Err(Error::InvalidParameter(format!(
                    "temperature {temp} not BCD-encodable"
                )));
            }
            Ok(vec![bcd_encode(whole as u8)?])
        }
        TemperatureFormat::SignedCenti => {
            let raw = (temp * 100.0).round() as i16;
            Ok(raw.to_le_bytes().to_vec())
        }
    }
}

/// Humidity wire format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumidityFormat {
    /// Raw percent byte.
    Direct = 0,
    /// Packed BCD percent byte.
    Bcd = 3,
}

/// Decode a relative humidity (percent) according to the format tag.
pub fn decode_humidity(payload: &[u8], format: HumidityFormat) -> Result<f32> {
    let &b = payload
        .first()
        .ok_or(Error::InvalidResponse("empty humidity payload".into()))?;
    match format {
        HumidityFormat::Direct => Ok(b as f32),
        HumidityFormat::Bcd => Ok(bcd_decode(b)? as f32),
    }
}

/// Encode a relative humidity (percent) according to the format tag.
pub fn encode_humidity(humidity: f32, format: HumidityFormat) -> Result<u8> {
    if !(0.0..=100.0).contains(&humidity) {
        return Err(Error::InvalidParameter(format!(
            "humidity {humidity} out of range"
        )));
    }
    let whole = humidity.round() as u8;
    match format {
        HumidityFormat::Direct => Ok(whole),
        HumidityFormat::Bcd => bcd_encode(whole.min(99)),
    }
}

// ---------------------------------------------------------------------------
// Plausibility validators
// ---------------------------------------------------------------------------

/// Plausibility check for a decoded temperature sensor reading.
pub fn valid_temperature(celsius: f32) -> bool {
    (-50.0..=80.0).contains(&celsius)
}

/// Plausibility check for a decoded humidity reading.
pub fn valid_humidity(percent: f32) -> bool {
    (0.0..=100.0).contains(&percent)
}

/// Plausibility check for a decoded power reading (kW).
pub fn valid_power(kw: f32) -> bool {
    (0.0..=10.0).contains(&kw)
}

/// Plausibility check for a decoded mains voltage reading (V).
pub fn valid_voltage(volts: f32) -> bool {
    (90.0..=260.0).contains(&volts)
}

/// Plausibility check for a decoded current reading (A).
pub fn valid_current(amps: f32) -> bool {
    (0.0..=50.0).contains(&amps)
}

// ---------------------------------------------------------------------------
// Noise handling
// ---------------------------------------------------------------------------

/// Clamp a new sensor reading so it moves at most `max_change_per_sec`
/// away from `previous` over the elapsed interval.
///
/// Glitched readings (a 40 °C jump between two polls) get pulled back to
/// the reachable envelope instead of being propagated.
pub fn limit_rate(previous: f32, candidate: f32, max_change_per_sec: f32, elapsed: Duration) -> f32 {
    let max_delta = max_change_per_sec * elapsed.as_secs_f32();
    candidate.clamp(previous - max_delta, previous + max_delta)
}

/// Stateful wrapper around [`limit_rate`] tracking the previous value.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_change_per_sec: f32,
    last: Option<f32>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `max_change_per_sec` units of
    /// change per second.
    pub fn new(max_change_per_sec: f32) -> Self {
        RateLimiter {
            max_change_per_sec,
            last: None,
        }
    }

    /// Accept a reading taken `elapsed` after the previous one and
    /// return the clamped value. The first reading passes through.
    pub fn accept(&mut self, value: f32, elapsed: Duration) -> f32 {
        let out = match self.last {
            Some(prev) => limit_rate(prev, value, self.max_change_per_sec, elapsed),
            None => value,
        };
        self.last = Some(out);
        out
    }
}

/// Rolling-window stability test.
///
/// Collects the most recent `capacity` samples and reports a value as
/// stable once the window is full and its standard deviation falls
/// below the threshold.
#[derive(Debug, Clone)]
pub struct StabilityWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    threshold: f32,
}

impl StabilityWindow {
    /// Create a window over the last `capacity` samples with the given
    /// standard-deviation threshold.
    pub fn new(capacity: usize, threshold: f32) -> Self {
        StabilityWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            threshold,
        }
    }

    /// Push a sample and return whether the windowed value is stable.
    pub fn push(&mut self, value: f32) -> bool {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.is_stable()
    }

    /// Whether the current window qualifies as stable.
    pub fn is_stable(&self) -> bool {
        self.samples.len() == self.capacity && self.std_dev() < self.threshold
    }

    /// Standard deviation of the current window contents.
    pub fn std_dev(&self) -> f32 {
        let n = self.samples.len();
        if n == 0 {
            return 0.0;
        }
        let mean: f32 = self.samples.iter().sum::<f32>() / n as f32;
        let var: f32 = self
            .samples
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f32>()
            / n as f32;
        var.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Target temperature
    // ---------------------------------------------------------------

    #[test]
    fn target_temp_known_points() {
        assert_eq!(decode_target_temp(b'@'), 18.0);
        assert_eq!(encode_target_temp(18.0), b'@');
        // 22.5 = 18.0 + 9 * 0.5 -> '@' + 9 = 'I'
        assert_eq!(encode_target_temp(22.5), b'I');
        assert_eq!(decode_target_temp(b'I'), 22.5);
        // Below the baseline: 16.0 -> '@' - 4 = '<'
        assert_eq!(encode_target_temp(16.0), b'<');
        assert_eq!(decode_target_temp(b'<'), 16.0);
    }

    #[test]
    fn target_temp_round_trip_on_half_degree_grid() {
        let mut t = 16.0f32;
        while t <= 30.0 {
            assert_eq!(
                decode_target_temp(encode_target_temp(t)),
                t,
                "round trip failed at {t}"
            );
            t += 0.5;
        }
    }

    #[test]
    fn target_temp_encode_rounds_to_grid() {
        assert_eq!(encode_target_temp(22.4), encode_target_temp(22.5));
        assert_eq!(encode_target_temp(22.6), encode_target_temp(22.5));
    }

    // ---------------------------------------------------------------
    // ASCII sensors
    // ---------------------------------------------------------------

    #[test]
    fn int_sensor_round_trip() {
        for v in [-999, -55, -1, 0, 1, 235, 999] {
            let encoded = encode_int_sensor(v).unwrap();
            assert_eq!(decode_int_sensor(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn int_sensor_rejects_garbage() {
        assert!(decode_int_sensor(b"5x2+").is_err());
        assert!(decode_int_sensor(b"532!").is_err());
        assert!(decode_int_sensor(b"53").is_err());
        assert!(encode_int_sensor(1000).is_err());
    }

    #[test]
    fn float_sensor_scales_tenths() {
        assert_eq!(decode_float_sensor(b"532+").unwrap(), 23.5);
        assert_eq!(decode_float_sensor(b"550-").unwrap(), -5.5);
    }

    // ---------------------------------------------------------------
    // Hex sensors
    // ---------------------------------------------------------------

    #[test]
    fn hex_sensor_round_trip() {
        for v in [0u16, 1, 0x00C6, 0x1234, 0xFFFF] {
            assert_eq!(decode_hex_sensor(&encode_hex_sensor(v)).unwrap(), v);
        }
    }

    #[test]
    fn hex_sensor_nibble_order_is_lsb_first() {
        // 0x07C6 on the wire: '6' 'C' '7' '0'
        assert_eq!(decode_hex_sensor(b"6C70").unwrap(), 0x07C6);
        assert_eq!(encode_hex_sensor(0x07C6), *b"6C70");
    }

    #[test]
    fn hex_sensor_accepts_lowercase() {
        assert_eq!(decode_hex_sensor(b"6c70").unwrap(), 0x07C6);
    }

    #[test]
    fn hex_sensor_rejects_garbage() {
        assert!(decode_hex_sensor(b"6G70").is_err());
        assert!(decode_hex_sensor(b"6C").is_err());
    }

    // ---------------------------------------------------------------
    // BCD and raw integers
    // ---------------------------------------------------------------

    #[test]
    fn bcd_round_trip() {
        for v in 0..=99u8 {
            assert_eq!(bcd_decode(bcd_encode(v).unwrap()).unwrap(), v);
        }
    }

    #[test]
    fn bcd_rejects_invalid() {
        assert!(bcd_decode(0x0A).is_err());
        assert!(bcd_decode(0xA0).is_err());
        assert!(bcd_encode(100).is_err());
    }

    #[test]
    fn endian_decoders() {
        assert_eq!(decode_u16_le(&[0x34, 0x12]).unwrap(), 0x1234);
        assert_eq!(decode_u16_be(&[0x12, 0x34]).unwrap(), 0x1234);
        assert_eq!(
            decode_u32_le(&[0x78, 0x56, 0x34, 0x12]).unwrap(),
            0x1234_5678
        );
        assert_eq!(
            decode_u32_be(&[0x12, 0x34, 0x56, 0x78]).unwrap(),
            0x1234_5678
        );
        assert!(decode_u16_le(&[0x01]).is_err());
        assert!(decode_u32_be(&[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn fixed_point_scalings() {
        assert_eq!(fixed_point_deci(235), 23.5);
        assert_eq!(fixed_point_deci(-55), -5.5);
        assert_eq!(fixed_point_centi(2250), 22.5);
    }

    // ---------------------------------------------------------------
    // Multi-format temperature / humidity
    // ---------------------------------------------------------------

    #[test]
    fn temperature_formats_round_trip() {
        let encoded = encode_temperature(22.5, TemperatureFormat::OffsetChar).unwrap();
        assert_eq!(
            decode_temperature(&encoded, TemperatureFormat::OffsetChar).unwrap(),
            22.5
        );

        let encoded = encode_temperature(23.0, TemperatureFormat::Bcd).unwrap();
        assert_eq!(encoded, vec![0x23]);
        assert_eq!(
            decode_temperature(&encoded, TemperatureFormat::Bcd).unwrap(),
            23.0
        );

        let encoded = encode_temperature(-12.75, TemperatureFormat::SignedCenti).unwrap();
        assert_eq!(
            decode_temperature(&encoded, TemperatureFormat::SignedCenti).unwrap(),
            -12.75
        );
    }

    #[test]
    fn temperature_bcd_rejects_negative() {
        assert!(encode_temperature(-5.0, TemperatureFormat::Bcd).is_err());
    }

    #[test]
    fn humidity_formats_round_trip() {
        assert_eq!(encode_humidity(55.0, HumidityFormat::Direct).unwrap(), 55);
        assert_eq!(
            decode_humidity(&[55], HumidityFormat::Direct).unwrap(),
            55.0
        );

        assert_eq!(encode_humidity(55.0, HumidityFormat::Bcd).unwrap(), 0x55);
        assert_eq!(decode_humidity(&[0x55], HumidityFormat::Bcd).unwrap(), 55.0);
    }

    #[test]
    fn humidity_rejects_out_of_range() {
        assert!(encode_humidity(-1.0, HumidityFormat::Direct).is_err());
        assert!(encode_humidity(101.0, HumidityFormat::Direct).is_err());
    }

    // ---------------------------------------------------------------
    // Validators
    // ---------------------------------------------------------------

    #[test]
    fn validators_accept_plausible_values() {
        assert!(valid_temperature(22.5));
        assert!(valid_temperature(-50.0));
        assert!(valid_temperature(80.0));
        assert!(valid_humidity(0.0));
        assert!(valid_power(1.2));
        assert!(valid_voltage(230.0));
        assert!(valid_current(6.5));
    }

    #[test]
    fn validators_reject_garbage() {
        assert!(!valid_temperature(-50.1));
        assert!(!valid_temperature(80.5));
        assert!(!valid_humidity(100.5));
        assert!(!valid_power(11.0));
        assert!(!valid_voltage(12.0));
        assert!(!valid_current(120.0));
    }

    // ---------------------------------------------------------------
    // Noise handling
    // ---------------------------------------------------------------

    #[test]
    fn rate_limit_clamps_spikes() {
        // 2 degrees/sec limit, one second elapsed, 40-degree glitch.
        let clamped = limit_rate(22.0, 62.0, 2.0, Duration::from_secs(1));
        assert_eq!(clamped, 24.0);
        let clamped = limit_rate(22.0, -18.0, 2.0, Duration::from_secs(1));
        assert_eq!(clamped, 20.0);
    }

    #[test]
    fn rate_limit_passes_slow_changes() {
        let v = limit_rate(22.0, 22.4, 1.0, Duration::from_secs(1));
        assert_eq!(v, 22.4);
    }

    #[test]
    fn rate_limiter_first_sample_passes() {
        let mut rl = RateLimiter::new(1.0);
        assert_eq!(rl.accept(35.0, Duration::from_secs(1)), 35.0);
        // Second sample is clamped relative to the first.
        assert_eq!(rl.accept(50.0, Duration::from_secs(2)), 37.0);
    }

    #[test]
    fn stability_window_needs_full_window() {
        let mut w = StabilityWindow::new(3, 0.5);
        assert!(!w.push(22.0));
        assert!(!w.push(22.1));
        assert!(w.push(22.0));
    }

    #[test]
    fn stability_window_rejects_noisy_data() {
        let mut w = StabilityWindow::new(4, 0.5);
        for v in [20.0, 25.0, 20.0, 25.0] {
            w.push(v);
        }
        assert!(!w.is_stable());

        // A run of quiet samples pushes the noise out of the window.
        for v in [22.0, 22.1, 22.0, 22.1] {
            w.push(v);
        }
        assert!(w.is_stable());
    }
}
