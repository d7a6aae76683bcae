//! Manufacturer protocol-variant strategies.
//!
//! Several manufacturers ship S21-compatible indoor units that share
//! the framing idea but differ in checksum algorithm, delimiter bytes,
//! value encodings, and command numbering. Each dialect is captured as
//! a [`VariantStrategy`]; exactly one strategy is active in the engine
//! at a time and all encode/decode traffic goes through it, so callers
//! never branch on the variant.
//!
//! The set of variants is closed: a fixed list of strategies plus the
//! standard fallback, selected at run time by the [`VariantDetector`]
//! from the unit's identity bytes.

use std::fmt;

use aclink_core::{Error, Result};

use crate::frame;
use crate::sensors::{
    self, HumidityFormat, TemperatureFormat, decode_temperature, encode_temperature,
};

/// Identifier of a known protocol dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Standard Daikin S21. Also the fallback when detection fails.
    Standard,
    /// Daikin units with the high-precision signed temperature format.
    DaikinEnhanced,
    /// Mitsubishi Electric dialect (XOR checksum, remapped commands).
    Mitsubishi,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Standard => write!(f, "Standard Daikin S21"),
            Variant::DaikinEnhanced => write!(f, "Enhanced Daikin S21"),
            Variant::Mitsubishi => write!(f, "Mitsubishi Electric"),
        }
    }
}

/// Checksum algorithm used by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    /// Byte sum with reserved-value promotion (standard S21).
    Sum,
    /// XOR over the frame body.
    Xor,
}

/// Frame delimiter convention used by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// STX/ETX delimiters.
    Standard,
    /// Manufacturer-specific delimiters.
    Custom,
}

/// Static metadata describing a dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantInfo {
    /// Which dialect this is.
    pub variant: Variant,
    /// Human-readable dialect name.
    pub name: &'static str,
    /// Manufacturer name.
    pub manufacturer: &'static str,
    /// Checksum algorithm.
    pub checksum_type: ChecksumType,
    /// Delimiter convention.
    pub frame_format: FrameFormat,
    /// Temperature value encoding.
    pub temperature_format: TemperatureFormat,
    /// Humidity value encoding.
    pub humidity_format: HumidityFormat,
    /// Whether the dialect speaks 4-character extended commands.
    pub extended_commands: bool,
    /// Whether value encodings deviate from the standard dialect.
    pub custom_encoding: bool,
    /// Manufacturer identity code.
    pub manufacturer_id: u16,
    /// Protocol identity code.
    pub protocol_id: u16,
}

/// One manufacturer dialect: checksum, frame validation, value codecs,
/// command remapping, and self-detection.
pub trait VariantStrategy: Send + Sync {
    /// Start-of-frame marker byte of this dialect.
    fn start_marker(&self) -> u8 {
        frame::STX
    }

    /// End-of-frame marker byte of this dialect.
    fn end_marker(&self) -> u8 {
        frame::ETX
    }

    /// Compute the frame checksum over the body (command + payload).
    fn checksum(&self, body: &[u8]) -> u8;

    /// Whether a complete buffer looks like a frame of this dialect
    /// (delimiters and minimum length only; checksum is verified
    /// separately).
    fn validate_frame(&self, buf: &[u8]) -> bool;

    /// Decode a temperature payload.
    fn decode_temperature(&self, payload: &[u8]) -> Result<f32>;

    /// Encode a temperature into the dialect's wire form.
    fn encode_temperature(&self, temp: f32) -> Result<Vec<u8>>;

    /// Decode a humidity payload.
    fn decode_humidity(&self, payload: &[u8]) -> Result<f32>;

    /// Encode a humidity percentage into the dialect's wire byte.
    fn encode_humidity(&self, humidity: f32) -> Result<u8>;

    /// Map an outgoing standard command pair to the dialect's numbering.
    fn map_command(&self, cmd0: u8, cmd1: u8) -> (u8, u8);

    /// Map an incoming dialect response pair back to standard numbering.
    fn map_response(&self, cmd0: u8, cmd1: u8) -> (u8, u8);

    /// Whether the given identity bytes belong to this dialect.
    fn detect(&self, identity: &[u8]) -> bool;

    /// Static metadata for this dialect.
    fn info(&self) -> VariantInfo;
}

// ---------------------------------------------------------------------------
// Standard Daikin
// ---------------------------------------------------------------------------

/// Standard Daikin S21 dialect; also the fallback strategy.
#[derive(Debug, Default)]
pub struct DaikinStandard;

impl VariantStrategy for DaikinStandard {
    fn checksum(&self, body: &[u8]) -> u8 {
        frame::checksum(body)
    }

    fn validate_frame(&self, buf: &[u8]) -> bool {
        buf.len() >= frame::MIN_FRAME_LEN
            && buf[0] == frame::STX
            && buf[buf.len() - 1] == frame::ETX
    }

    fn decode_temperature(&self, payload: &[u8]) -> Result<f32> {
        decode_temperature(payload, TemperatureFormat::OffsetChar)
    }

    fn encode_temperature(&self, temp: f32) -> Result<Vec<u8>> {
        encode_temperature(temp, TemperatureFormat::OffsetChar)
    }

    fn decode_humidity(&self, payload: &[u8]) -> Result<f32> {
        sensors::decode_humidity(payload, HumidityFormat::Direct)
    }

    fn encode_humidity(&self, humidity: f32) -> Result<u8> {
        sensors::encode_humidity(humidity, HumidityFormat::Direct)
    }

    fn map_command(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        (cmd0, cmd1)
    }

    fn map_response(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        (cmd0, cmd1)
    }

    fn detect(&self, identity: &[u8]) -> bool {
        identity.len() >= 2 && &identity[..2] == b"DK"
    }

    fn info(&self) -> VariantInfo {
        VariantInfo {
            variant: Variant::Standard,
            name: "Standard Daikin S21",
            manufacturer: "Daikin",
            checksum_type: ChecksumType::Sum,
            frame_format: FrameFormat::Standard,
            temperature_format: TemperatureFormat::OffsetChar,
            humidity_format: HumidityFormat::Direct,
            extended_commands: true,
            custom_encoding: false,
            manufacturer_id: 0x44, // 'D'
            protocol_id: 0x4B,     // 'K'
        }
    }
}

// ---------------------------------------------------------------------------
// Enhanced Daikin
// ---------------------------------------------------------------------------

/// Daikin dialect with the 16-bit signed temperature format, allowing
/// sub-degree precision and negative readings.
#[derive(Debug, Default)]
pub struct DaikinEnhanced;

impl VariantStrategy for DaikinEnhanced {
    fn checksum(&self, body: &[u8]) -> u8 {
        frame::checksum(body)
    }

    fn validate_frame(&self, buf: &[u8]) -> bool {
        DaikinStandard.validate_frame(buf)
    }

    fn decode_temperature(&self, payload: &[u8]) -> Result<f32> {
        decode_temperature(payload, TemperatureFormat::SignedCenti)
    }

    fn encode_temperature(&self, temp: f32) -> Result<Vec<u8>> {
        encode_temperature(temp, TemperatureFormat::SignedCenti)
    }

    fn decode_humidity(&self, payload: &[u8]) -> Result<f32> {
        sensors::decode_humidity(payload, HumidityFormat::Direct)
    }

    fn encode_humidity(&self, humidity: f32) -> Result<u8> {
        sensors::encode_humidity(humidity, HumidityFormat::Direct)
    }

    fn map_command(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        (cmd0, cmd1)
    }

    fn map_response(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        (cmd0, cmd1)
    }

    fn detect(&self, identity: &[u8]) -> bool {
        identity.len() >= 3 && &identity[..3] == b"DKE"
    }

    fn info(&self) -> VariantInfo {
        VariantInfo {
            temperature_format: TemperatureFormat::SignedCenti,
            variant: Variant::DaikinEnhanced,
            name: "Enhanced Daikin S21",
            protocol_id: 0x45, // 'E'
            ..DaikinStandard.info()
        }
    }
}

// ---------------------------------------------------------------------------
// Mitsubishi Electric
// ---------------------------------------------------------------------------

/// Start-of-frame marker of the Mitsubishi dialect.
const MITSUBISHI_SOF: u8 = 0x5A;

/// End-of-frame marker of the Mitsubishi dialect.
const MITSUBISHI_EOF: u8 = 0xA5;

/// Mitsubishi Electric dialect: XOR checksum, custom delimiters, BCD
/// value encodings, and remapped status/control command pairs.
#[derive(Debug, Default)]
pub struct Mitsubishi;

impl VariantStrategy for Mitsubishi {
    fn start_marker(&self) -> u8 {
        MITSUBISHI_SOF
    }

    fn end_marker(&self) -> u8 {
        MITSUBISHI_EOF
    }

    fn checksum(&self, body: &[u8]) -> u8 {
        body.iter().fold(0u8, |acc, &b| acc ^ b)
    }

    fn validate_frame(&self, buf: &[u8]) -> bool {
        buf.len() >= frame::MIN_FRAME_LEN
            && buf[0] == MITSUBISHI_SOF
            && buf[buf.len() - 1] == MITSUBISHI_EOF
    }

    fn decode_temperature(&self, payload: &[u8]) -> Result<f32> {
        decode_temperature(payload, TemperatureFormat::Bcd)
    }

    fn encode_temperature(&self, temp: f32) -> Result<Vec<u8>> {
        encode_temperature(temp, TemperatureFormat::Bcd)
    }

    fn decode_humidity(&self, payload: &[u8]) -> Result<f32> {
        sensors::decode_humidity(payload, HumidityFormat::Bcd)
    }

    fn encode_humidity(&self, humidity: f32) -> Result<u8> {
        sensors::encode_humidity(humidity, HumidityFormat::Bcd)
    }

    fn map_command(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        match (cmd0, cmd1) {
            (b'F', b'1') => (b'S', b'1'),
            (b'D', b'1') => (b'C', b'1'),
            other => other,
        }
    }

    fn map_response(&self, cmd0: u8, cmd1: u8) -> (u8, u8) {
        match (cmd0, cmd1) {
            (b'R', b'1') => (b'G', b'1'),
            (b'A', b'1') => (b'H', b'1'),
            other => other,
        }
    }

    fn detect(&self, identity: &[u8]) -> bool {
        identity.len() >= 2 && &identity[..2] == b"ME"
    }

    fn info(&self) -> VariantInfo {
        VariantInfo {
            variant: Variant::Mitsubishi,
            name: "Mitsubishi Electric",
            manufacturer: "Mitsubishi",
            checksum_type: ChecksumType::Xor,
            frame_format: FrameFormat::Custom,
            temperature_format: TemperatureFormat::Bcd,
            humidity_format: HumidityFormat::Bcd,
            extended_commands: false,
            custom_encoding: true,
            manufacturer_id: 0x4D, // 'M'
            protocol_id: 0x45,     // 'E'
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Construct the strategy for a given variant.
pub fn strategy_for(variant: Variant) -> Box<dyn VariantStrategy> {
    match variant {
        Variant::Standard => Box::new(DaikinStandard),
        Variant::DaikinEnhanced => Box::new(DaikinEnhanced),
        Variant::Mitsubishi => Box::new(Mitsubishi),
    }
}

/// Runtime dialect detector holding one strategy per known variant.
pub struct VariantDetector {
    strategies: Vec<Box<dyn VariantStrategy>>,
}

impl VariantDetector {
    /// Create a detector with all known strategies registered.
    ///
    /// More specific identities are checked first so that the "DKE"
    /// prefix is not swallowed by the plain "DK" match.
    pub fn new() -> Self {
        VariantDetector {
            strategies: vec![
                Box::new(DaikinEnhanced),
                Box::new(Mitsubishi),
                Box::new(DaikinStandard),
            ],
        }
    }

    /// Match identity bytes against the registered strategies.
    ///
    /// Returns the first matching variant; identities nobody claims stay
    /// on [`Variant::Standard`].
    pub fn detect(&self, identity: &[u8]) -> Variant {
        self.strategies
            .iter()
            .find(|s| s.detect(identity))
            .map(|s| s.info().variant)
            .unwrap_or(Variant::Standard)
    }

    /// Metadata for every registered variant.
    pub fn supported_variants(&self) -> Vec<VariantInfo> {
        self.strategies.iter().map(|s| s.info()).collect()
    }
}

impl Default for VariantDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a command frame in the active dialect: the strategy's
/// delimiters around the body, closed with the strategy's checksum.
///
/// For [`DaikinStandard`] this produces exactly what
/// [`frame::encode_frame`] does.
pub fn encode_frame_for(
    strategy: &dyn VariantStrategy,
    cmd0: u8,
    cmd1: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > frame::MAX_PAYLOAD_LEN {
        return Err(Error::BufferOverflow);
    }
    let mut buf = Vec::with_capacity(frame::MIN_FRAME_LEN + payload.len());
    buf.push(strategy.start_marker());
    buf.push(cmd0);
    buf.push(cmd1);
    buf.extend_from_slice(payload);
    buf.push(strategy.checksum(&buf[1..]));
    buf.push(strategy.end_marker());
    Ok(buf)
}

/// Validate a dialect-framed buffer's checksum.
///
/// Standard-dialect frames are verified by [`frame::split_frame`]; the
/// Mitsubishi dialect keeps the same body layout between its own
/// delimiters, so the check mirrors it with the XOR algorithm.
pub fn verify_dialect_checksum(strategy: &dyn VariantStrategy, buf: &[u8]) -> Result<()> {
    if !strategy.validate_frame(buf) {
        return Err(Error::InvalidResponse("frame failed dialect validation".into()));
    }
    let body = &buf[1..buf.len() - 2];
    let expected = strategy.checksum(body);
    let actual = buf[buf.len() - 2];
    if expected != actual {
        return Err(Error::Checksum { expected, actual });
    }
    Ok(())
}
