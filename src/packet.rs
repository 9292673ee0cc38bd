//! Framing layer for the EVBee binary packet protocol.
//!
//! Every message on the wire is one frame:
//!
//! Start Byte | End Byte | Meaning
//! 0          | 1        | A constant header with value [0x5A, 0x5A]
//! 2          | 3        | Total frame length, little-endian (= payload length + 12)
//! 4          | 5        | Command id, little-endian
//! 6          | 7        | Payload length, little-endian
//! 8          | x        | The payload
//! x+1        | x+4      | A CRC-32 over bytes 0-x, little-endian
//!
//! All multi-byte integers are little-endian. The device sometimes delivers
//! two frames back to back in a single notification; [`decode`] extracts only
//! the first, and the caller re-invokes it on the remainder.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::CodecError;

/// Fixed two-byte frame prefix.
pub const MAGIC: [u8; 2] = [0x5A, 0x5A];

/// Smallest possible frame: header plus checksum, empty payload.
pub const MIN_FRAME_LEN: usize = 12;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One decoded frame, header fields extracted and payload sliced out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub command_id: u16,
    /// Payload length as declared in the header. May disagree with
    /// `payload.len()` if the buffer was truncated.
    pub declared_length: u16,
    pub payload: Vec<u8>,
}

impl DecodedMessage {
    /// Number of bytes the frame occupies on the wire according to its header.
    /// The remainder of a concatenated buffer starts at this offset.
    pub fn frame_len(&self) -> usize {
        self.declared_length as usize + 12
    }
}

/// Build a framed, checksummed packet for the given command and payload.
pub fn encode(command_id: u16, payload: &[u8]) -> Vec<u8> {
    let total_len = (payload.len() + 12) as u16;
    let mut buf = Vec::with_capacity(payload.len() + 12);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&total_len.to_le_bytes());
    buf.extend_from_slice(&command_id.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = CRC32.checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Extract the first frame from `buffer`.
///
/// Returns `None` if the buffer is shorter than [`MIN_FRAME_LEN`] or does not
/// start with the magic prefix. The checksum is deliberately not verified
/// here; the device's own consumer is lenient and a frame with a corrupted
/// trailer still parses. Use [`verify_checksum`] for the strict check.
///
/// The payload is clamped to the bytes actually present, so a corrupt
/// declared length never reads past the buffer. If the buffer holds a second
/// concatenated frame, only the first is decoded; advance the buffer by
/// [`DecodedMessage::frame_len`] and decode again.
pub fn decode(buffer: &[u8]) -> Option<DecodedMessage> {
    if buffer.len() < MIN_FRAME_LEN || buffer[0..2] != MAGIC {
        return None;
    }
    let command_id = u16::from_le_bytes([buffer[4], buffer[5]]);
    let declared_length = u16::from_le_bytes([buffer[6], buffer[7]]);
    let end = (buffer.len() - 4).min(8 + declared_length as usize);
    Some(DecodedMessage {
        command_id,
        declared_length,
        payload: buffer[8..end].to_vec(),
    })
}

/// Recompute the CRC-32 of a single frame and compare it to the trailer.
///
/// A mismatch is reportable but non-fatal: callers log it and process the
/// frame anyway, matching the device's lenient-consumer contract.
pub fn verify_checksum(buffer: &[u8]) -> Result<(), CodecError> {
    if buffer.len() < MIN_FRAME_LEN || buffer[0..2] != MAGIC {
        return Err(CodecError::MalformedFrame);
    }
    let declared_length = u16::from_le_bytes([buffer[6], buffer[7]]) as usize;
    let body_end = 8 + declared_length;
    if buffer.len() < body_end + 4 {
        return Err(CodecError::MalformedFrame);
    }
    let expected = u32::from_le_bytes([
        buffer[body_end],
        buffer[body_end + 1],
        buffer[body_end + 2],
        buffer[body_end + 3],
    ]);
    let computed = CRC32.checksum(&buffer[..body_end]);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}

#[test]
fn test_encode_init_frame() {
    let frame = encode(0x0000, b"12345600");
    assert_eq!(frame.len(), 20);
    assert_eq!(&frame[0..2], &MAGIC);
    assert_eq!(u16::from_le_bytes([frame[2], frame[3]]), 20);
    assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), 0x0000);
    assert_eq!(u16::from_le_bytes([frame[6], frame[7]]), 8);
    assert_eq!(&frame[8..16], b"12345600");
    let crc = CRC32.checksum(&frame[0..16]);
    assert_eq!(&frame[16..20], &crc.to_le_bytes());
}

#[test]
fn test_decode_recovers_encoded_fields() {
    let payload = [0x01, 0x30, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef];
    let frame = encode(0x0004, &payload);
    let msg = decode(&frame).unwrap();
    assert_eq!(msg.command_id, 0x0004);
    assert_eq!(msg.declared_length, 8);
    assert_eq!(msg.payload, payload);
    assert_eq!(msg.frame_len(), frame.len());
}

#[test]
fn test_decode_empty_payload() {
    let frame = encode(0x00A6, &[]);
    assert_eq!(frame.len(), 12);
    let msg = decode(&frame).unwrap();
    assert_eq!(msg.command_id, 0x00A6);
    assert_eq!(msg.declared_length, 0);
    assert!(msg.payload.is_empty());
}

#[test]
fn test_decode_rejects_bad_magic() {
    let mut frame = encode(0x0001, &[0x00]);
    frame[0] = 0x5B;
    assert_eq!(decode(&frame), None);
}

#[test]
fn test_decode_rejects_short_buffer() {
    assert_eq!(decode(&[0x5A, 0x5A, 0x0c, 0x00]), None);
}

#[test]
fn test_decode_clamps_corrupt_declared_length() {
    let mut frame = encode(0x0104, &[0x00; 4]);
    // claim a huge payload; decode must not read past the buffer
    frame[6] = 0xff;
    frame[7] = 0xff;
    let msg = decode(&frame).unwrap();
    assert_eq!(msg.declared_length, 0xffff);
    assert_eq!(msg.payload.len(), frame.len() - 12);
}

#[test]
fn test_decode_concatenated_frames() {
    let mut buffer = encode(0x0104, &[0x02; 14]);
    buffer.extend_from_slice(&encode(0x0105, &[0x01; 14]));

    let first = decode(&buffer).unwrap();
    assert_eq!(first.command_id, 0x0104);
    assert_eq!(first.payload, [0x02; 14]);

    let rest = &buffer[first.frame_len()..];
    let second = decode(rest).unwrap();
    assert_eq!(second.command_id, 0x0105);
    assert_eq!(second.payload, [0x01; 14]);
    assert_eq!(rest.len(), second.frame_len());
}

#[test]
fn test_verify_checksum_happy() {
    let frame = encode(0x0005, &[0x01, 0x00]);
    assert!(verify_checksum(&frame).is_ok());
}

#[test]
fn test_verify_checksum_mismatch() {
    let mut frame = encode(0x0005, &[0x01, 0x00]);
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    assert!(matches!(
        verify_checksum(&frame),
        Err(CodecError::ChecksumMismatch { .. })
    ));
}
