use thiserror::Error;

/// Errors raised while writing or reading a `.vmb` container.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("truncated image: expected {expected} more byte(s) at offset {offset}")]
    UnexpectedEof { offset: usize, expected: usize },
    #[error("bad magic number: expected `RTMC`, found {0:?}")]
    BadMagic([u8; 4]),
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u32),
    #[error("header checksum mismatch: expected 0x{expected:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("unknown opcode byte 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("invalid mode word {0} (expected 0=release or 1=debug)")]
    InvalidMode(u32),
    #[error("string or name exceeds the serializable length limit")]
    LengthLimitExceeded,
}
