//! Protocol version buckets and feature flags.
//!
//! S21 units report their protocol generation through a cascade of
//! queries of decreasing descriptiveness (see the engine's negotiation
//! driver). This module holds the pure pieces: the ordered version
//! enumeration, payload parsers for the version queries, and the
//! [`Features`] capability set with its version seeding and bitmap
//! refinement rules.

use std::fmt;

use aclink_core::{Error, Result};

/// Protocol version bucket, ordered oldest to newest.
///
/// The ordering is load-bearing: feature gating and command-support
/// checks compare with `>=` against bucket values. `Future` is a
/// reserved ceiling for units reporting a major version above the known
/// range; they are assumed to support everything v3.40 does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// Version not (yet) determined; treated as the earliest.
    Unknown,
    /// Protocol v1 (oldest units, bare `M` model query only).
    V1,
    /// Protocol v2 (`F8` reports '2'; most 2010s units).
    V2,
    /// Protocol v3.00 (first generation with 4-character commands).
    V300,
    /// Protocol v3.10.
    V310,
    /// Protocol v3.20.
    V320,
    /// Protocol v3.40.
    V340,
    /// Reported major version above the known range.
    Future,
}

impl ProtocolVersion {
    /// Map a reported major/minor pair to the nearest known bucket.
    ///
    /// Exact matches are preferred; an unknown minor buckets down to the
    /// closest lower known value; a major above the known range maps to
    /// [`ProtocolVersion::Future`].
    pub fn from_major_minor(major: u8, minor: u8) -> ProtocolVersion {
        match major {
            0 => ProtocolVersion::Unknown,
            1 => ProtocolVersion::V1,
            2 => ProtocolVersion::V2,
            3 => match minor {
                0..=9 => ProtocolVersion::V300,
                10..=19 => ProtocolVersion::V310,
                20..=39 => ProtocolVersion::V320,
                _ => ProtocolVersion::V340,
            },
            _ => ProtocolVersion::Future,
        }
    }

    /// The major/minor pair this bucket displays as.
    pub fn major_minor(self) -> (u8, u8) {
        match self {
            ProtocolVersion::Unknown => (0, 0),
            ProtocolVersion::V1 => (1, 0),
            ProtocolVersion::V2 => (2, 0),
            ProtocolVersion::V300 => (3, 0),
            ProtocolVersion::V310 => (3, 10),
            ProtocolVersion::V320 => (3, 20),
            ProtocolVersion::V340 => (3, 40),
            ProtocolVersion::Future => (4, 0),
        }
    }

    /// Whether this version speaks the 4-character extended command form.
    pub fn has_extended_commands(self) -> bool {
        self >= ProtocolVersion::V300
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Unknown => write!(f, "unknown"),
            ProtocolVersion::Future => write!(f, "future"),
            _ => {
                let (major, minor) = self.major_minor();
                write!(f, "{major}.{minor:02}")
            }
        }
    }
}

/// Parse the `FY00` reply payload: four ASCII digits in the protocol's
/// traditional inverted spelling of `MMmm` (so v3.20 arrives as `"0230"`).
///
/// Returns the `(major, minor)` pair.
pub fn parse_version_payload(payload: &[u8]) -> Result<(u8, u8)> {
    if payload.len() < 4 {
        return Err(Error::InvalidResponse(format!(
            "version payload too short: {} bytes",
            payload.len()
        )));
    }
    let digit = |b: u8| -> Result<u8> {
        if b.is_ascii_digit() {
            Ok(b - b'0')
        } else {
            Err(Error::InvalidResponse(format!(
                "non-digit 0x{b:02X} in version payload"
            )))
        }
    };
    // Digits are transmitted least significant first.
    let major = digit(payload[3])? * 10 + digit(payload[2])?;
    let minor = digit(payload[1])? * 10 + digit(payload[0])?;
    Ok((major, minor))
}

/// Parse the legacy `F8` reply payload (protocol version prior to v3).
///
/// Byte 1 carries `'0' + major`; v3+ units freeze it at `'2'`, so this
/// query can never distinguish anything newer than v2.
pub fn parse_legacy_version_payload(payload: &[u8]) -> Result<ProtocolVersion> {
    if payload.len() < 2 {
        return Err(Error::InvalidResponse(format!(
            "legacy version payload too short: {} bytes",
            payload.len()
        )));
    }
    match payload[1] {
        b'0' | 0x00 | b'1' => Ok(ProtocolVersion::V1),
        b'2' => Ok(ProtocolVersion::V2),
        other => Err(Error::InvalidResponse(format!(
            "unexpected legacy version byte 0x{other:02X}"
        ))),
    }
}

/// Independent boolean capability flags of the connected unit.
///
/// All flags default to `false` and are progressively set as the
/// version and capability-query responses are interpreted. Two feature
/// sets are equal iff every flag matches (derived `PartialEq`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Automatic heat/cool mode.
    pub auto_mode: bool,
    /// Dehumidify mode.
    pub dry_mode: bool,
    /// Fan-only mode.
    pub fan_mode: bool,
    /// Powerful (boost) mode.
    pub powerful: bool,
    /// Eco / energy-saving mode.
    pub eco: bool,
    /// Quiet fan operation.
    pub quiet: bool,
    /// Vertical louver swing.
    pub swing: bool,
    /// Horizontal louver swing.
    pub horizontal_swing: bool,
    /// Indoor humidity sensor fitted.
    pub humidity_sensor: bool,
    /// Room temperature readout.
    pub temperature_display: bool,
    /// Multi-zone / demand control.
    pub multi_zone: bool,
    /// Power consumption reporting.
    pub energy_monitoring: bool,
}

impl Features {
    /// Seed flags implied by the protocol version alone, before any
    /// capability query has run.
    pub fn seed_from_version(&mut self, version: ProtocolVersion) {
        if version >= ProtocolVersion::V2 {
            self.auto_mode = true;
            self.dry_mode = true;
            self.fan_mode = true;
            self.temperature_display = true;
        }
        if version >= ProtocolVersion::V300 {
            self.swing = true;
        }
        if version >= ProtocolVersion::V320 {
            self.powerful = true;
            self.eco = true;
        }
    }

    /// Apply the `F2` optional-features bitmap.
    ///
    /// Byte 0 bits 2/3 (swing, horizontal swing) and byte 3 bit 1
    /// (humidity sensor) follow the known wire meaning; byte 1 bits
    /// 0/1/2 carry powerful/eco/quiet. The bitmap is authoritative: it
    /// overwrites version-seeded guesses in both directions.
    pub fn apply_features_bitmap(&mut self, payload: &[u8]) {
        if payload.len() < 4 {
            return;
        }
        self.swing = payload[0] & 0x04 != 0;
        self.horizontal_swing = payload[0] & 0x08 != 0;
        self.powerful = payload[1] & 0x01 != 0;
        self.eco = payload[1] & 0x02 != 0;
        self.quiet = payload[1] & 0x04 != 0;
        self.humidity_sensor = payload[3] & 0x02 != 0;
    }

    /// Apply the `FK` secondary-features bitmap.
    ///
    /// Byte 1 bit 0 flags power-consumption reporting; byte 2 bit 2 is
    /// the fan-controls gate (when clear, swing reporting is
    /// meaningless and both swing flags are cleared); byte 3 bit 0
    /// flags demand/multi-zone control on v3+ units.
    pub fn apply_secondary_bitmap(&mut self, payload: &[u8], version: ProtocolVersion) {
        if payload.len() < 4 {
            return;
        }
        self.energy_monitoring = payload[1] & 0x01 != 0;
        if payload[2] & 0x04 == 0 {
            self.swing = false;
            self.horizontal_swing = false;
        }
        if version >= ProtocolVersion::V300 {
            self.multi_zone = payload[3] & 0x01 != 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Version ordering and bucketing
    // ---------------------------------------------------------------

    #[test]
    fn version_ordering_is_monotonic() {
        use ProtocolVersion::*;
        let ordered = [Unknown, V1, V2, V300, V310, V320, V340, Future];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn bucket_exact_matches() {
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 20),
            ProtocolVersion::V320
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 0),
            ProtocolVersion::V300
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 40),
            ProtocolVersion::V340
        );
        assert_eq!(ProtocolVersion::from_major_minor(2, 0), ProtocolVersion::V2);
    }

    #[test]
    fn bucket_unknown_minor_rounds_down() {
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 15),
            ProtocolVersion::V310
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 25),
            ProtocolVersion::V320
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 5),
            ProtocolVersion::V300
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(3, 99),
            ProtocolVersion::V340
        );
    }

    #[test]
    fn bucket_future_major() {
        assert_eq!(
            ProtocolVersion::from_major_minor(4, 0),
            ProtocolVersion::Future
        );
        assert_eq!(
            ProtocolVersion::from_major_minor(9, 99),
            ProtocolVersion::Future
        );
    }

    #[test]
    fn version_display() {
        assert_eq!(ProtocolVersion::V320.to_string(), "3.20");
        assert_eq!(ProtocolVersion::V2.to_string(), "2.00");
        assert_eq!(ProtocolVersion::Unknown.to_string(), "unknown");
        assert_eq!(ProtocolVersion::Future.to_string(), "future");
    }

    #[test]
    fn extended_commands_floor() {
        assert!(!ProtocolVersion::V2.has_extended_commands());
        assert!(ProtocolVersion::V300.has_extended_commands());
        assert!(ProtocolVersion::Future.has_extended_commands());
    }

    // ---------------------------------------------------------------
    // Payload parsers
    // ---------------------------------------------------------------

    #[test]
    fn parse_version_inverted_digits() {
        // v3.20 arrives as "0230"
        assert_eq!(parse_version_payload(b"0230").unwrap(), (3, 20));
        // v3.00 arrives as "0030"
        assert_eq!(parse_version_payload(b"0030").unwrap(), (3, 0));
        // v3.40 arrives as "0430"
        assert_eq!(parse_version_payload(b"0430").unwrap(), (3, 40));
    }

    #[test]
    fn parse_version_rejects_garbage() {
        assert!(parse_version_payload(b"02").is_err());
        assert!(parse_version_payload(b"02A0").is_err());
        assert!(parse_version_payload(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn parse_legacy_version_variants() {
        assert_eq!(
            parse_legacy_version_payload(b"0200").unwrap(),
            ProtocolVersion::V2
        );
        assert_eq!(
            parse_legacy_version_payload(b"0100").unwrap(),
            ProtocolVersion::V1
        );
        // Old units send raw 0x00 instead of ASCII '0'.
        assert_eq!(
            parse_legacy_version_payload(&[b'0', 0x00, 0x00, 0x00]).unwrap(),
            ProtocolVersion::V1
        );
        assert!(parse_legacy_version_payload(b"0900").is_err());
        assert!(parse_legacy_version_payload(b"0").is_err());
    }

    // ---------------------------------------------------------------
    // Features
    // ---------------------------------------------------------------

    #[test]
    fn features_default_all_false() {
        assert_eq!(Features::default(), Features::default());
        let f = Features::default();
        assert!(!f.auto_mode && !f.powerful && !f.swing && !f.energy_monitoring);
    }

    #[test]
    fn seed_v2_sets_basic_modes() {
        let mut f = Features::default();
        f.seed_from_version(ProtocolVersion::V2);
        assert!(f.auto_mode && f.dry_mode && f.fan_mode && f.temperature_display);
        assert!(!f.swing && !f.powerful);
    }

    #[test]
    fn seed_v320_sets_special_modes() {
        let mut f = Features::default();
        f.seed_from_version(ProtocolVersion::V320);
        assert!(f.swing && f.powerful && f.eco);
        assert!(!f.quiet); // quiet only comes from the F2 bitmap
    }

    #[test]
    fn features_bitmap_sets_and_clears() {
        let mut f = Features::default();
        f.seed_from_version(ProtocolVersion::V320);
        // swing+horizontal, powerful+quiet but no eco, humidity sensor
        f.apply_features_bitmap(&[0x0C, 0x05, 0x00, 0x02]);
        assert!(f.swing && f.horizontal_swing);
        assert!(f.powerful && f.quiet);
        assert!(!f.eco); // bitmap overrides the version seed
        assert!(f.humidity_sensor);
    }

    #[test]
    fn features_bitmap_ignores_short_payload() {
        let mut f = Features::default();
        f.apply_features_bitmap(&[0xFF]);
        assert_eq!(f, Features::default());
    }

    #[test]
    fn secondary_bitmap_fan_gate_clears_swing() {
        let mut f = Features::default();
        f.apply_features_bitmap(&[0x0C, 0x00, 0x00, 0x00]);
        assert!(f.swing && f.horizontal_swing);

        // Fan-controls gate off: swing reporting is void.
        f.apply_secondary_bitmap(&[0x71, 0x73, 0x31, 0x31], ProtocolVersion::V320);
        assert!(!f.swing && !f.horizontal_swing);
        assert!(f.energy_monitoring);
        assert!(f.multi_zone);
    }

    #[test]
    fn secondary_bitmap_multi_zone_needs_v3() {
        let mut f = Features::default();
        f.apply_secondary_bitmap(&[0x71, 0x73, 0x35, 0x31], ProtocolVersion::V2);
        assert!(!f.multi_zone);

        f.apply_secondary_bitmap(&[0x71, 0x73, 0x35, 0x31], ProtocolVersion::V300);
        assert!(f.multi_zone);
    }

    #[test]
    fn feature_sets_compare_fieldwise() {
        let mut a = Features::default();
        let mut b = Features::default();
        assert_eq!(a, b);
        a.quiet = true;
        assert_ne!(a, b);
        b.quiet = true;
        assert_eq!(a, b);
    }
}
