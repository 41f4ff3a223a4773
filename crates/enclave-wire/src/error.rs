//! Error type for wire-format violations.

use thiserror::Error;

/// A blob or section of the wire protocol did not match its fixed layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The blob is not exactly the size the format prescribes.
    #[error("invalid {kind} blob length: expected {expected} bytes, got {actual}")]
    InvalidBlobLength {
        /// Human-readable name of the blob format (e.g. `"ECC public key"`).
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The blob header does not carry the expected magic constant.
    #[error("invalid {kind} blob magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic {
        kind: &'static str,
        expected: [u8; 4],
        actual: [u8; 4],
    },

    /// A length field inside the blob header disagrees with the fixed layout.
    #[error("invalid {kind} blob header: {detail}")]
    InvalidHeader {
        kind: &'static str,
        detail: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_sizes() {
        let e = WireError::InvalidBlobLength {
            kind: "ECC public key",
            expected: 104,
            actual: 103,
        };
        let msg = e.to_string();
        assert!(msg.contains("104"));
        assert!(msg.contains("103"));
        assert!(msg.contains("ECC public key"));
    }
}
