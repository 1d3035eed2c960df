//! Integration test common infrastructure.
//!
//! Spawns real `pulsehubd` instances and drives them over a real WebSocket
//! connection, the same black-box style the teacher's own `tests/common`
//! uses for `slircd-ng` -- except the transport is WebSocket + MessagePack
//! envelopes instead of raw-TCP IRC lines, and tokens are minted with the
//! same HMAC scheme `src/auth/mod.rs` verifies with (duplicated here since
//! this package has no library target integration tests can link against).

pub mod client;
pub mod server;

pub use client::TestClient;
pub use server::TestServer;

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Mint a bearer token for `role:tenant_id:client_id`, matching
/// `HmacTokenVerifier`'s wire format exactly.
pub fn sign_token(secret: &str, role: &str, tenant_id: &str, client_id: &str) -> String {
    let message = format!("{role}:{tenant_id}:{client_id}");
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    let signature: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{message}:{signature}")
}
