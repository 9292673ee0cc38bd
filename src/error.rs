/// Errors the packet codec can report.
///
/// Neither variant is fatal to a session: a malformed buffer is dropped and
/// a checksum mismatch is logged while the frame is still processed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer too short for a frame, or missing the magic prefix.
    #[error("malformed frame")]
    MalformedFrame,
    /// The frame's CRC-32 trailer does not match the recomputed value.
    #[error("checksum mismatch: frame carries {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}
