/// Errors produced by hash and object-id operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("invalid hex length: expected {expected} chars, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex character '{character}' at position {position}")]
    InvalidHex { position: usize, character: char },

    #[error("fan-out table truncated: {actual} bytes")]
    TruncatedFanout { actual: usize },

    #[error("fan-out table decreases at byte {byte:#04x}")]
    NonMonotonicFanout { byte: u8 },
}
