//! Error types for the wire codec.

use thiserror::Error;

/// Convenience type alias for Results using [`WireError`].
pub type Result<T, E = WireError> = std::result::Result<T, E>;

/// Errors encountered while encoding or decoding wire envelopes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Failed to serialize a value to its wire representation.
    #[error("encode error: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    /// Failed to deserialize a value from its wire representation.
    #[error("decode error: {0}")]
    Decode(#[source] rmp_serde::decode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_stable() {
        let bad = [0xc1u8]; // reserved/never-used msgpack byte
        let err: Result<crate::Envelope> = crate::decode(&bad);
        assert!(err.is_err());
        assert!(matches!(err.unwrap_err(), WireError::Decode(_)));
    }
}
