//! Identity & access (§4.1): token verification and the two admissibility
//! checks every other component builds on.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A verified identity: who is connected, in which tenant, with what role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The identity's role.
    pub role: Role,
    /// Tenant this identity belongs to. Empty only for `SuperAdmin`.
    pub tenant_id: String,
    /// Client id within the tenant.
    pub client_id: String,
}

/// Role strings are stable wire constants (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// May use any tenant.
    SuperAdmin,
    /// Admin-kind within its own tenant.
    Admin,
    /// Ordinary client, bound to its own tenant and `allowed_channels`.
    Client,
}

impl Role {
    /// Parse the stable wire constant for a role.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SuperAdmin" => Some(Role::SuperAdmin),
            "Admin" => Some(Role::Admin),
            "Client" => Some(Role::Client),
            _ => None,
        }
    }

    /// Render the stable wire constant for a role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::Admin => "Admin",
            Role::Client => "Client",
        }
    }
}

impl Identity {
    /// True if `SuperAdmin`, or if this identity's tenant matches `tenant_id`.
    pub fn may_use(&self, tenant_id: &str) -> bool {
        matches!(self.role, Role::SuperAdmin) || self.tenant_id == tenant_id
    }

    /// True for `SuperAdmin` or `Admin` — bypasses `allowed_channels` checks.
    pub fn admin_kind(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::Admin)
    }
}

/// External collaborator: turns an opaque bearer token into an [`Identity`].
///
/// Out of scope per the core's purpose statement beyond this trait: a real
/// deployment plugs in a JWT/OIDC verifier behind the same interface.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`, returning the identity it encodes, or `None` if the
    /// token is missing, malformed, or fails signature verification.
    fn verify(&self, token: &str) -> Option<Identity>;
}

/// Default `TokenVerifier` for local development and tests.
///
/// Token format: `role:tenant_id:client_id:hex(hmac_sha256(secret, "role:tenant_id:client_id"))`.
/// Missing `tenant_id` is only accepted for `SuperAdmin`, matching §4.1's
/// "Missing tenant id allowed for SuperAdmin only."
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl HmacTokenVerifier {
    /// Build a verifier keyed on `secret`.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mint a token for tests and local tooling.
    pub fn sign(&self, role: Role, tenant_id: &str, client_id: &str) -> String {
        let message = format!("{}:{}:{}", role.as_str(), tenant_id, client_id);
        let signature = self.signature_hex(&message);
        format!("{message}:{signature}")
    }

    fn signature_hex(&self, message: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(message.as_bytes());
        let bytes = mac.finalize().into_bytes();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Option<Identity> {
        let mut parts = token.splitn(4, ':');
        let role_str = parts.next()?;
        let tenant_id = parts.next()?;
        let client_id = parts.next()?;
        let signature = parts.next()?;

        let role = Role::parse(role_str)?;
        if client_id.is_empty() {
            return None;
        }
        if tenant_id.is_empty() && !matches!(role, Role::SuperAdmin) {
            return None;
        }

        let message = format!("{role_str}:{tenant_id}:{client_id}");
        let expected = self.signature_hex(&message);
        if expected.as_bytes().ct_eq(signature.as_bytes()).unwrap_u8() != 1 {
            return None;
        }

        Some(Identity {
            role,
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> HmacTokenVerifier {
        HmacTokenVerifier::new(b"test-secret".to_vec())
    }

    #[test]
    fn round_trips_a_client_token() {
        let v = verifier();
        let token = v.sign(Role::Client, "tenant-1", "client-1");
        let identity = v.verify(&token).expect("valid token");
        assert_eq!(identity.role, Role::Client);
        assert_eq!(identity.tenant_id, "tenant-1");
        assert_eq!(identity.client_id, "client-1");
    }

    #[test]
    fn rejects_tampered_signature() {
        let v = verifier();
        let mut token = v.sign(Role::Client, "tenant-1", "client-1");
        token.push('0');
        assert!(v.verify(&token).is_none());
    }

    #[test]
    fn super_admin_may_omit_tenant() {
        let v = verifier();
        let token = v.sign(Role::SuperAdmin, "", "root");
        let identity = v.verify(&token).expect("super admin token is valid");
        assert!(identity.may_use("any-tenant"));
    }

    #[test]
    fn client_without_tenant_is_rejected() {
        let v = verifier();
        let token = v.sign(Role::Client, "", "client-1");
        assert!(v.verify(&token).is_none());
    }

    #[test]
    fn may_use_respects_tenant_boundary() {
        let admin = Identity {
            role: Role::Admin,
            tenant_id: "tenant-1".into(),
            client_id: "admin-1".into(),
        };
        assert!(admin.may_use("tenant-1"));
        assert!(!admin.may_use("tenant-2"));
        assert!(admin.admin_kind());
    }
}
