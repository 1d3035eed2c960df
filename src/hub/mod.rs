//! The hub (§4.4): per-tenant channel registry, fan-out, and presence.
//!
//! Grounded on `original_source/channels/core/{hub,channel,presence}.go`.
//! The Go original uses one actor goroutine per channel mediated by a
//! mailbox; this rewrite uses `dashmap` + atomics directly (no actor, no
//! mailbox), matching spec §5's "no global locks... fine-grained maps and
//! atomics" and the Go original's own later data structures
//! (`sync.Map`/`atomic.Int32` inside `HubChannel` itself) more closely than
//! its actor-style `Hub.broadcast` channel would have.

pub mod channel;
pub mod deps;
pub mod presence;
pub mod registry;

use async_trait::async_trait;

pub use channel::HubChannel;
pub use deps::ChannelDeps;
pub use registry::{Hub, HubRegistry};

/// What a `HubChannel` needs from a connected session: a stable identifier
/// and an outbound sink. `crate::session::Session` implements this; the hub
/// never needs to know about sessions, connections, or the wire protocol
/// beyond these two operations, which breaks the otherwise-circular
/// session/hub dependency.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Stable identifier for this session, unique within a `HubChannel`'s
    /// subscriber set (`"{client_id}-{device_id}"`).
    fn identifier(&self) -> &str;
    /// The session's client id (not unique by itself -- a client may hold
    /// more than one session, one per device).
    fn client_id(&self) -> &str;
    /// Send an already-encoded outbound frame to this session. Must not
    /// block; sessions with a full outbound queue drop the frame and log,
    /// matching the connection layer's bounded send queue.
    async fn publish(&self, bytes: Vec<u8>);
}
