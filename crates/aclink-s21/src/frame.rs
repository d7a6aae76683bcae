//! S21 frame encoder/decoder.
//!
//! The S21 protocol uses checksummed binary frames on a half-duplex
//! serial line. This module handles the pure byte-level encoding and
//! decoding; the transport read loop with its timeouts lives in the
//! engine.
//!
//! # Frame format
//!
//! ```text
//! 0x02 <cmd0> <cmd1> [<payload>...] <checksum> 0x03
//! ```
//!
//! - `STX` / `ETX`: frame delimiters
//! - `cmd0 cmd1`: two-character command code (`F1`, `RH`, `D1`, ...)
//! - `payload`: variable length, typically 4 bytes
//! - `checksum`: sum of all bytes between STX and the checksum itself
//!
//! Protocol v3 extended commands use a four-character command code
//! (`FU00`, `FY00`, ...) with a correspondingly longer minimum frame.
//!
//! Every frame is confirmed by the receiving side with a bare ACK byte;
//! a NAK byte rejects the command.

use bytes::{BufMut, BytesMut};

use aclink_core::{Error, Result};

/// Start-of-frame marker.
pub const STX: u8 = 0x02;

/// End-of-frame marker.
pub const ETX: u8 = 0x03;

/// Positive acknowledgement byte, sent bare (outside any frame).
pub const ACK: u8 = 0x06;

/// Negative acknowledgement byte.
pub const NAK: u8 = 0x15;

/// Maximum length of a complete frame, delimiters included.
///
/// Standard replies carry 4 payload bytes; extended v3 replies go up to
/// the low twenties. Anything beyond this cap is treated as a receive
/// buffer overflow.
pub const MAX_FRAME_LEN: usize = 32;

/// Framing overhead: STX + checksum + ETX.
pub const FRAMING_LEN: usize = 3;

/// Minimum length of a standard frame (framing + two command bytes).
pub const MIN_FRAME_LEN: usize = FRAMING_LEN + 2;

/// Minimum length of an extended (four-character command) frame.
pub const MIN_EXT_FRAME_LEN: usize = FRAMING_LEN + 4;

/// Maximum payload length of a standard frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// A parsed S21 frame: command pair plus payload.
///
/// For extended commands the four-character code is carried as
/// `cmd0 cmd1` plus the first two payload bytes; [`S21Frame::ext_tag`]
/// exposes that split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S21Frame {
    /// First command byte (class: `F` query, `G` reply, `D` set, ...).
    pub cmd0: u8,
    /// Second command byte.
    pub cmd1: u8,
    /// Payload bytes (may be empty).
    pub payload: Vec<u8>,
}

impl S21Frame {
    /// The extended-command tag (third and fourth command characters),
    /// if the payload is long enough to carry one.
    pub fn ext_tag(&self) -> Option<[u8; 2]> {
        if self.payload.len() >= 2 {
            Some([self.payload[0], self.payload[1]])
        } else {
            None
        }
    }

    /// Payload with the extended tag stripped.
    pub fn ext_payload(&self) -> &[u8] {
        if self.payload.len() >= 2 {
            &self.payload[2..]
        } else {
            &[]
        }
    }
}

/// Compute the checksum over a frame body (everything between STX and
/// the checksum byte: command code plus payload).
///
/// The reserved control bytes STX, ETX, and ACK are forbidden on the
/// wire even as checksum values; a colliding sum is promoted by +2.
pub fn checksum(body: &[u8]) -> u8 {
    let c = body
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b));
    if c == STX || c == ETX || c == ACK {
        c + 2
    } else {
        c
    }
}

/// Encode a standard two-character command frame.
///
/// # Example
///
/// ```
/// use aclink_s21::frame::encode_frame;
///
/// // Basic status query, no payload
/// let bytes = encode_frame(b'F', b'1', &[]).unwrap();
/// assert_eq!(bytes, vec![0x02, b'F', b'1', 0x77, 0x03]);
/// ```
pub fn encode_frame(cmd0: u8, cmd1: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::BufferOverflow);
    }
    let mut buf = BytesMut::with_capacity(MIN_FRAME_LEN + payload.len());
    buf.put_u8(STX);
    buf.put_u8(cmd0);
    buf.put_u8(cmd1);
    buf.put_slice(payload);
    buf.put_u8(checksum(&buf[1..]));
    buf.put_u8(ETX);
    Ok(buf.to_vec())
}

/// Encode an extended four-character command frame (protocol v3+).
///
/// # Example
///
/// ```
/// use aclink_s21::frame::encode_ext_frame;
///
/// // v3 protocol version query
/// let bytes = encode_ext_frame([b'F', b'Y', b'0', b'0'], &[]).unwrap();
/// assert_eq!(bytes[0], 0x02);
/// assert_eq!(&bytes[1..5], b"FY00");
/// ```
pub fn encode_ext_frame(cmd: [u8; 4], payload: &[u8]) -> Result<Vec<u8>> {
    if cmd.len() + payload.len() > MAX_FRAME_LEN - FRAMING_LEN {
        return Err(Error::BufferOverflow);
    }
    let mut buf = BytesMut::with_capacity(MIN_EXT_FRAME_LEN + payload.len());
    buf.put_u8(STX);
    buf.put_slice(&cmd);
    buf.put_slice(payload);
    buf.put_u8(checksum(&buf[1..]));
    buf.put_u8(ETX);
    Ok(buf.to_vec())
}

/// Validate a complete frame buffer and split it into command and payload.
///
/// Checks delimiters, minimum length, and checksum. Returns
/// [`Error::Checksum`] on a mismatch and [`Error::InvalidResponse`] on a
/// structural problem.
pub fn split_frame(buf: &[u8]) -> Result<S21Frame> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(Error::InvalidResponse(format!(
            "frame too short: {} bytes",
            buf.len()
        )));
    }
    if buf.len() > MAX_FRAME_LEN {
        return Err(Error::BufferOverflow);
    }
    if buf[0] != STX {
        return Err(Error::InvalidResponse(format!(
            "missing STX, got 0x{:02X}",
            buf[0]
        )));
    }
    if buf[buf.len() - 1] != ETX {
        return Err(Error::InvalidResponse(format!(
            "missing ETX, got 0x{:02X}",
            buf[buf.len() - 1]
        )));
    }

    let body = &buf[1..buf.len() - 2];
    let expected = checksum(body);
    let actual = buf[buf.len() - 2];
    if expected != actual {
        return Err(Error::Checksum { expected, actual });
    }

    Ok(S21Frame {
        cmd0: body[0],
        cmd1: body[1],
        payload: body[2..].to_vec(),
    })
}

/// The reply command class expected for an outgoing command class.
///
/// Query classes transform deterministically: `F` queries answer with
/// `G`, sensor `R` queries answer with `S`, and the bare `M` model query
/// echoes `M`. Set-class `D` commands are confirmed by a bare ACK with
/// no reply frame at all.
pub fn reply_class(cmd0: u8) -> Option<u8> {
    match cmd0 {
        b'F' => Some(b'G'),
        b'R' => Some(b'S'),
        b'M' => Some(b'M'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Checksum
    // ---------------------------------------------------------------

    #[test]
    fn checksum_plain_sum() {
        // 'F' + '1' = 0x46 + 0x31 = 0x77
        assert_eq!(checksum(b"F1"), 0x77);
    }

    #[test]
    fn checksum_wraps_modulo_256() {
        assert_eq!(checksum(&[0xFF, 0xFF]), 0xFE);
    }

    #[test]
    fn checksum_promotes_reserved_values() {
        // Sums colliding with STX/ETX/ACK are promoted by +2.
        assert_eq!(checksum(&[0x01, 0x01]), 0x04); // would be STX
        assert_eq!(checksum(&[0x01, 0x02]), 0x05); // would be ETX
        assert_eq!(checksum(&[0x01, 0x05]), 0x08); // would be ACK
        // Neighboring values are untouched.
        assert_eq!(checksum(&[0x01, 0x03]), 0x04);
        assert_eq!(checksum(&[0x01, 0x04]), 0x05);
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_query_no_payload() {
        let bytes = encode_frame(b'F', b'1', &[]).unwrap();
        assert_eq!(bytes, vec![STX, b'F', b'1', 0x77, ETX]);
    }

    #[test]
    fn encode_set_with_payload() {
        // Power on, cool, 22.5 deg (encoded 'I'), fan auto.
        let bytes = encode_frame(b'D', b'1', &[b'1', b'3', b'I', b'A']).unwrap();
        let body_sum = checksum(&bytes[1..bytes.len() - 2]);
        assert_eq!(bytes[0], STX);
        assert_eq!(&bytes[1..3], b"D1");
        assert_eq!(&bytes[3..7], b"13IA");
        assert_eq!(bytes[7], body_sum);
        assert_eq!(bytes[8], ETX);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![b'0'; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_frame(b'D', b'1', &payload).unwrap_err(),
            Error::BufferOverflow
        ));
    }

    #[test]
    fn encode_ext_version_query() {
        let bytes = encode_ext_frame(*b"FY00", &[]).unwrap();
        assert_eq!(bytes.len(), MIN_EXT_FRAME_LEN);
        assert_eq!(&bytes[1..5], b"FY00");
        assert_eq!(bytes[5], checksum(b"FY00"));
        assert_eq!(bytes[6], ETX);
    }

    // ---------------------------------------------------------------
    // Decoding
    // ---------------------------------------------------------------

    #[test]
    fn split_status_reply() {
        let encoded = encode_frame(b'G', b'1', &[b'1', b'3', b'I', b'A']).unwrap();
        let frame = split_frame(&encoded).unwrap();
        assert_eq!(frame.cmd0, b'G');
        assert_eq!(frame.cmd1, b'1');
        assert_eq!(frame.payload, b"13IA");
    }

    #[test]
    fn split_reply_without_payload() {
        let encoded = encode_frame(b'G', b'8', &[]).unwrap();
        let frame = split_frame(&encoded).unwrap();
        assert_eq!(frame.cmd0, b'G');
        assert_eq!(frame.cmd1, b'8');
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn split_rejects_short_buffer() {
        assert!(matches!(
            split_frame(&[STX, b'G', 0x47, ETX]).unwrap_err(),
            Error::InvalidResponse(_)
        ));
    }

    #[test]
    fn split_rejects_bad_delimiters() {
        let mut encoded = encode_frame(b'G', b'1', b"13IA").unwrap();
        encoded[0] = 0x00;
        assert!(matches!(
            split_frame(&encoded).unwrap_err(),
            Error::InvalidResponse(_)
        ));

        let mut encoded = encode_frame(b'G', b'1', b"13IA").unwrap();
        let last = encoded.len() - 1;
        encoded[last] = 0x00;
        assert!(matches!(
            split_frame(&encoded).unwrap_err(),
            Error::InvalidResponse(_)
        ));
    }

    #[test]
    fn split_rejects_checksum_mismatch() {
        let mut encoded = encode_frame(b'G', b'1', b"13IA").unwrap();
        let ck_pos = encoded.len() - 2;
        encoded[ck_pos] ^= 0xFF;
        match split_frame(&encoded).unwrap_err() {
            Error::Checksum { expected, actual } => {
                assert_ne!(expected, actual);
            }
            other => panic!("expected Checksum, got {other:?}"),
        }
    }

    #[test]
    fn split_rejects_oversized_buffer() {
        let buf = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            split_frame(&buf).unwrap_err(),
            Error::BufferOverflow
        ));
    }

    // ---------------------------------------------------------------
    // Round trip and corruption detection
    // ---------------------------------------------------------------

    #[test]
    fn round_trip_all_standard_payload_lengths() {
        for len in 0..=4usize {
            let payload: Vec<u8> = (0..len as u8).map(|i| b'0' + i).collect();
            let encoded = encode_frame(b'G', b'5', &payload).unwrap();
            let frame = split_frame(&encoded).unwrap();
            assert_eq!(frame.cmd0, b'G');
            assert_eq!(frame.cmd1, b'5');
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn any_single_bit_corruption_is_detected() {
        let encoded = encode_frame(b'G', b'1', &[b'1', b'3', b'I', b'A']).unwrap();
        // Sanity: the pristine frame decodes.
        assert!(split_frame(&encoded).is_ok());

        for byte_idx in 0..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = encoded.clone();
                corrupted[byte_idx] ^= 1 << bit;
                assert!(
                    split_frame(&corrupted).is_err(),
                    "corruption at byte {byte_idx} bit {bit} went undetected"
                );
            }
        }
    }

    // ---------------------------------------------------------------
    // Extended frames and reply classes
    // ---------------------------------------------------------------

    #[test]
    fn ext_tag_split() {
        let encoded = encode_ext_frame(*b"GU00", &[0x33, 0x33, 0x30]).unwrap();
        let frame = split_frame(&encoded).unwrap();
        assert_eq!(frame.cmd0, b'G');
        assert_eq!(frame.cmd1, b'U');
        assert_eq!(frame.ext_tag(), Some([b'0', b'0']));
        assert_eq!(frame.ext_payload(), &[0x33, 0x33, 0x30]);
    }

    #[test]
    fn reply_class_transforms() {
        assert_eq!(reply_class(b'F'), Some(b'G'));
        assert_eq!(reply_class(b'R'), Some(b'S'));
        assert_eq!(reply_class(b'M'), Some(b'M'));
        assert_eq!(reply_class(b'D'), None);
    }
}
