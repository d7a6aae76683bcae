//! Dynamic command-capability discovery.
//!
//! Units of the same protocol generation still differ in which query
//! commands they answer. For capable versions the engine probes a fixed
//! table of commands once at startup, recording a supported-commands
//! bitmap, and separately probes the extended (`FU`) command family.
//! Both results are cached for the engine's lifetime.
//!
//! A command counts as supported only if it passes the version floor
//! AND, when discovery has run, the discovered bitmap.

use crate::frame::{S21Frame, reply_class};
use crate::version::ProtocolVersion;

/// One entry of the discovery probe table.
#[derive(Debug, Clone, Copy)]
pub struct ProbeCommand {
    /// Command pair to probe.
    pub cmd: [u8; 2],
    /// Bit index in the supported-commands bitmap.
    pub bit: u32,
    /// What the command reads.
    pub description: &'static str,
}

/// The fixed probe table: every optional query the engine may use,
/// with its capability bit.
pub const PROBE_TABLE: &[ProbeCommand] = &[
    ProbeCommand { cmd: *b"F1", bit: 0, description: "basic control state" },
    ProbeCommand { cmd: *b"F5", bit: 1, description: "swing and humidity setting" },
    ProbeCommand { cmd: *b"F6", bit: 2, description: "special modes" },
    ProbeCommand { cmd: *b"F7", bit: 3, description: "demand and eco" },
    ProbeCommand { cmd: *b"F8", bit: 4, description: "legacy protocol version" },
    ProbeCommand { cmd: *b"F9", bit: 5, description: "compact temperature pair" },
    ProbeCommand { cmd: *b"FC", bit: 6, description: "model code" },
    ProbeCommand { cmd: *b"FK", bit: 7, description: "secondary feature bitmap" },
    ProbeCommand { cmd: *b"FM", bit: 8, description: "power consumption counter" },
    ProbeCommand { cmd: *b"RH", bit: 9, description: "room temperature sensor" },
    ProbeCommand { cmd: *b"RI", bit: 10, description: "coil temperature sensor" },
    ProbeCommand { cmd: *b"Ra", bit: 11, description: "outdoor temperature sensor" },
    ProbeCommand { cmd: *b"RL", bit: 12, description: "fan rpm sensor" },
    ProbeCommand { cmd: *b"Rd", bit: 13, description: "compressor rpm sensor" },
    ProbeCommand { cmd: *b"Re", bit: 14, description: "indoor humidity sensor" },
];

/// Extended-command sub-types probed with a zero sub-command byte.
pub const EXTENDED_PROBES: &[[u8; 2]] = &[*b"00", *b"02", *b"04"];

/// Delay between successive probes, respecting device pacing.
pub const INTER_PROBE_DELAY_MS: u64 = 35;

/// Look up a probe-table entry by command pair.
pub fn probe_entry(cmd0: u8, cmd1: u8) -> Option<&'static ProbeCommand> {
    PROBE_TABLE
        .iter()
        .find(|p| p.cmd[0] == cmd0 && p.cmd[1] == cmd1)
}

/// Whether a reply frame is the valid answer to a probe: the reply's
/// command class must be the deterministic transform of the probe's
/// (`F`→`G`, `R`→`S`) with the second command byte echoed.
pub fn probe_reply_matches(probe: [u8; 2], reply: &S21Frame) -> bool {
    match reply_class(probe[0]) {
        Some(expected) => reply.cmd0 == expected && reply.cmd1 == probe[1],
        None => false,
    }
}

/// Whether an extended reply matches the probed sub-type: it must
/// decode as a `GU` frame with the sub-type tag echoed.
pub fn extended_reply_matches(sub_type: [u8; 2], reply: &S21Frame) -> bool {
    reply.cmd0 == b'G' && reply.cmd1 == b'U' && reply.ext_tag() == Some(sub_type)
}

/// Minimum protocol version at which a command pair may be attempted.
///
/// The basic control set works on anything that frames at all; the
/// optional query set needs v2; the 4-character extended family needs
/// v3.
pub fn version_floor(cmd0: u8, cmd1: u8) -> ProtocolVersion {
    match (cmd0, cmd1) {
        (b'F', b'1') | (b'D', b'1') | (b'R', b'H') | (b'M', _) => ProtocolVersion::Unknown,
        (b'F', b'U') | (b'F', b'Y') | (b'F', b'X') => ProtocolVersion::V300,
        (b'F', _) | (b'R', _) | (b'D', _) => ProtocolVersion::V2,
        _ => ProtocolVersion::Future,
    }
}

/// Cached discovery results.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSet {
    /// Bitmap over [`PROBE_TABLE`] bit indices.
    bitmap: u32,
    /// Bitmap over [`EXTENDED_PROBES`] indices.
    extended: u8,
    /// Whether the probe pass has run.
    probed: bool,
}

impl CommandSet {
    /// Mark the probe pass as complete.
    pub fn mark_probed(&mut self) {
        self.probed = true;
    }

    /// Whether the probe pass has run.
    pub fn probed(&self) -> bool {
        self.probed
    }

    /// Record a probed command as supported.
    pub fn mark_supported(&mut self, bit: u32) {
        self.bitmap |= 1 << bit;
    }

    /// Record an extended sub-type as supported.
    pub fn mark_extended_supported(&mut self, index: usize) {
        self.extended |= 1 << index;
    }

    /// Raw supported-commands bitmap.
    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    /// Whether an extended sub-type probe succeeded.
    pub fn extended_supported(&self, index: usize) -> bool {
        self.extended & (1 << index) != 0
    }

    /// Count of discovered commands.
    pub fn supported_count(&self) -> u32 {
        self.bitmap.count_ones()
    }

    /// Forget everything (full engine reset).
    pub fn clear(&mut self) {
        *self = CommandSet::default();
    }

    /// Check a command pair against version floor and, when discovery
    /// has run, the discovered bitmap. Commands outside the probe table
    /// (the `D` set commands, extended queries) are gated by version
    /// floor alone.
    pub fn is_command_supported(&self, version: ProtocolVersion, cmd0: u8, cmd1: u8) -> bool {
        if version < version_floor(cmd0, cmd1) {
            return false;
        }
        if !self.probed {
            return true;
        }
        match probe_entry(cmd0, cmd1) {
            Some(entry) => self.bitmap & (1 << entry.bit) != 0,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::S21Frame;

    fn reply(cmd0: u8, cmd1: u8, payload: &[u8]) -> S21Frame {
        S21Frame {
            cmd0,
            cmd1,
            payload: payload.to_vec(),
        }
    }

    // ---------------------------------------------------------------
    // Probe table
    // ---------------------------------------------------------------

    #[test]
    fn probe_table_bits_are_unique() {
        let mut seen = 0u32;
        for p in PROBE_TABLE {
            assert_eq!(seen & (1 << p.bit), 0, "duplicate bit {}", p.bit);
            seen |= 1 << p.bit;
        }
    }

    #[test]
    fn probe_entry_lookup() {
        assert_eq!(probe_entry(b'F', b'5').unwrap().bit, 1);
        assert_eq!(probe_entry(b'R', b'H').unwrap().bit, 9);
        assert!(probe_entry(b'D', b'1').is_none());
    }

    // ---------------------------------------------------------------
    // Reply matching
    // ---------------------------------------------------------------

    #[test]
    fn query_reply_transform() {
        assert!(probe_reply_matches(*b"F1", &reply(b'G', b'1', b"13IA")));
        assert!(probe_reply_matches(*b"RH", &reply(b'S', b'H', b"532+")));
        // Wrong class or echoed byte.
        assert!(!probe_reply_matches(*b"F1", &reply(b'G', b'2', b"")));
        assert!(!probe_reply_matches(*b"F1", &reply(b'S', b'1', b"")));
        // Set-class commands have no reply frame at all.
        assert!(!probe_reply_matches(*b"D1", &reply(b'G', b'1', b"")));
    }

    #[test]
    fn extended_reply_transform() {
        let ok = reply(b'G', b'U', b"00\x33\x33\x30");
        assert!(extended_reply_matches(*b"00", &ok));
        // Tag mismatch.
        assert!(!extended_reply_matches(*b"02", &ok));
        // Wrong command class.
        assert!(!extended_reply_matches(*b"00", &reply(b'G', b'1', b"00")));
        // Tag missing entirely.
        assert!(!extended_reply_matches(*b"00", &reply(b'G', b'U', b"")));
    }

    // ---------------------------------------------------------------
    // Version floors
    // ---------------------------------------------------------------

    #[test]
    fn basic_commands_have_no_floor() {
        assert_eq!(version_floor(b'F', b'1'), ProtocolVersion::Unknown);
        assert_eq!(version_floor(b'D', b'1'), ProtocolVersion::Unknown);
        assert_eq!(version_floor(b'R', b'H'), ProtocolVersion::Unknown);
    }

    #[test]
    fn optional_queries_need_v2() {
        assert_eq!(version_floor(b'F', b'5'), ProtocolVersion::V2);
        assert_eq!(version_floor(b'F', b'M'), ProtocolVersion::V2);
        assert_eq!(version_floor(b'R', b'e'), ProtocolVersion::V2);
        assert_eq!(version_floor(b'D', b'5'), ProtocolVersion::V2);
    }

    #[test]
    fn extended_family_needs_v3() {
        assert_eq!(version_floor(b'F', b'U'), ProtocolVersion::V300);
        assert_eq!(version_floor(b'F', b'Y'), ProtocolVersion::V300);
    }

    // ---------------------------------------------------------------
    // CommandSet
    // ---------------------------------------------------------------

    #[test]
    fn unprobed_set_gates_by_version_only() {
        let set = CommandSet::default();
        assert!(set.is_command_supported(ProtocolVersion::V2, b'F', b'5'));
        assert!(!set.is_command_supported(ProtocolVersion::V1, b'F', b'5'));
        assert!(set.is_command_supported(ProtocolVersion::Unknown, b'F', b'1'));
    }

    #[test]
    fn probed_set_requires_both_checks() {
        let mut set = CommandSet::default();
        set.mark_supported(probe_entry(b'F', b'1').unwrap().bit);
        set.mark_probed();

        // Discovered and above the floor.
        assert!(set.is_command_supported(ProtocolVersion::V320, b'F', b'1'));
        // Above the floor but not discovered.
        assert!(!set.is_command_supported(ProtocolVersion::V320, b'F', b'5'));
        // Discovered would not matter below the floor.
        set.mark_supported(probe_entry(b'F', b'5').unwrap().bit);
        assert!(!set.is_command_supported(ProtocolVersion::V1, b'F', b'5'));
        assert!(set.is_command_supported(ProtocolVersion::V2, b'F', b'5'));
    }

    #[test]
    fn untabled_commands_pass_when_probed() {
        let mut set = CommandSet::default();
        set.mark_probed();
        // D1 is not probeable (no reply frame); the version floor rules.
        assert!(set.is_command_supported(ProtocolVersion::Unknown, b'D', b'1'));
        assert!(set.is_command_supported(ProtocolVersion::V2, b'D', b'5'));
    }

    #[test]
    fn extended_bits() {
        let mut set = CommandSet::default();
        assert!(!set.extended_supported(0));
        set.mark_extended_supported(0);
        set.mark_extended_supported(2);
        assert!(set.extended_supported(0));
        assert!(!set.extended_supported(1));
        assert!(set.extended_supported(2));
    }

    #[test]
    fn clear_resets_everything() {
        let mut set = CommandSet::default();
        set.mark_supported(3);
        set.mark_extended_supported(1);
        set.mark_probed();
        set.clear();
        assert!(!set.probed());
        assert_eq!(set.bitmap(), 0);
        assert!(!set.extended_supported(1));
        assert_eq!(set.supported_count(), 0);
    }
}
