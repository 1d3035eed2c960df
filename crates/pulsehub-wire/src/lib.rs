//! # pulsehub-wire
//!
//! Wire envelopes and binary codec for the pulsehub pub/sub protocol.
//!
//! This crate is intentionally free of any knowledge of tokio, the engine,
//! or transport details: it only knows how to encode and decode the typed
//! records that cross the client socket (`Envelope`) and the cross-node bus
//! (`ExternalEnvelope`). Encoding is MessagePack (via `rmp-serde`), which
//! gives deterministic struct/map encoding and forward-compatible field
//! addition without a schema compiler.
//!
//! ## Quick start
//!
//! ```rust
//! use pulsehub_wire::{encode, decode, Envelope, EnvelopePayload, SubscribeRequest};
//!
//! let envelope = Envelope::new(EnvelopePayload::Subscribe(SubscribeRequest {
//!     id: 7,
//!     channel_id: "room-1".into(),
//! }));
//! let bytes = encode(&envelope).unwrap();
//! let decoded: Envelope = decode(&bytes).unwrap();
//! assert_eq!(decoded, envelope);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod external;

pub use envelope::{
    Ack, ChannelEventPayload, ClientJoin, ClientLeave, Envelope, EnvelopePayload,
    InitialPresenceStatus, OnlineStatusUpdate, PresenceStatus, PublishRequest, SubscribeRequest,
};
pub use error::{Result, WireError};
pub use external::{ExternalEnvelope, ExternalPayload};

/// Encode a value to its wire representation.
///
/// Encoding is deterministic: identical input always produces identical
/// bytes, which matters for anything that hashes or diffs frames.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(WireError::Encode)
}

/// Decode a value from its wire representation.
pub fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(WireError::Decode)
}
