//! # Connection Authentication
//!
//! A connection presents two headers on every connect: `Payload`, the base64
//! encoding of a small JSON document naming the identity, the permissions and
//! a UTC timestamp, and `PayloadHMAC`, the hex encoded XOR of one
//! HMAC-SHA256 per permission key computed over that payload.
//!
//! Project keys have the form `<perm>-<identity-hex>-<secret-hex>` where `perm`
//! is one of `R` (read), `W` (write) or `A` (admin).

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// # Auth Error
///
/// Problems found while parsing project keys or signing the payload.
pub enum AuthError {
    /// The key does not split into exactly three `-` separated parts.
    #[error("Invalid format for project key: expected <perm>-<identity>-<secret>")]
    InvalidFormat,

    /// The permission prefix is not one of R, W or A.
    #[error("Invalid permission prefix '{0}' for project key. The valid prefixes are RWA")]
    InvalidPermission(String),

    /// The identity part is empty or not hexadecimal.
    #[error("Invalid format for identity key")]
    InvalidIdentity,

    /// The secret part is empty or not hexadecimal.
    #[error("Invalid format for permission key")]
    InvalidSecret,

    /// No keys were supplied.
    #[error("At least one project key is required")]
    NoKeys,

    /// The supplied keys belong to different identities.
    #[error("Project keys carry different identities ({0} and {1})")]
    IdentityMismatch(String, String),
}

/// A key's permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    /// Subscribe to and list channels.
    Read,
    /// Publish to channels.
    Write,
    /// Administrative access.
    Admin,
}

impl Permission {
    /// The single letter used in keys and in the payload's `permissions` field.
    pub fn as_char(self) -> char {
        match self {
            Permission::Read => 'R',
            Permission::Write => 'W',
            Permission::Admin => 'A',
        }
    }

    fn parse(prefix: &str) -> Result<Self, AuthError> {
        match prefix {
            "R" => Ok(Permission::Read),
            "W" => Ok(Permission::Write),
            "A" => Ok(Permission::Admin),
            other => Err(AuthError::InvalidPermission(other.to_string())),
        }
    }
}

/// A parsed project key.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey {
    /// The key's permission.
    pub perm: Permission,
    /// Hex identity shared by all keys of a project.
    pub identity: String,
    secret: Vec<u8>,
}

// The secret stays out of logs.
impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKey")
            .field("perm", &self.perm)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl AuthKey {
    /// Parses and validates a `<perm>-<identity-hex>-<secret-hex>` key.
    pub fn parse(key: &str) -> Result<Self, AuthError> {
        let parts: Vec<&str> = key.trim().split('-').collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidFormat);
        }

        let perm = Permission::parse(parts[0])?;

        let identity = parts[1];
        if identity.is_empty() || !identity.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AuthError::InvalidIdentity);
        }

        let secret = hex::decode(parts[2]).map_err(|_| AuthError::InvalidSecret)?;
        if secret.is_empty() {
            return Err(AuthError::InvalidSecret);
        }

        Ok(Self {
            perm,
            identity: identity.to_string(),
            secret,
        })
    }

    fn sign(&self, payload: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(payload);
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

/// The JSON document carried, base64 encoded, in the `Payload` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub identity: String,
    /// Permission letters in R, W, A order.
    pub permissions: String,
    /// ISO-8601 UTC time the payload was produced.
    pub security_timestamp: String,
    /// Session being resumed, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_uuid: Option<String>,
}

impl AuthPayload {
    /// Decodes a `Payload` header value back into its JSON document.
    pub fn from_header(payload_base64: &str) -> Option<Self> {
        let bytes = general_purpose::STANDARD.decode(payload_base64).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Header values for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub payload_base64: String,
    pub payload_hmac: String,
}

/// Signs connection payloads with a validated set of project keys.
#[derive(Debug, Clone)]
pub struct Authenticator {
    keys: BTreeMap<Permission, AuthKey>,
    identity: String,
}

impl Authenticator {
    /// Builds an authenticator from raw key strings.
    ///
    /// Keys are de-duplicated by permission, the last one wins. All keys must
    /// share one identity.
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Result<Self, AuthError> {
        let mut parsed: BTreeMap<Permission, AuthKey> = BTreeMap::new();
        for raw in keys {
            let key = AuthKey::parse(raw.as_ref())?;
            parsed.insert(key.perm, key);
        }

        let mut identities = parsed.values().map(|k| k.identity.as_str());
        let identity = identities.next().ok_or(AuthError::NoKeys)?.to_string();
        if let Some(other) = identities.find(|id| !id.eq_ignore_ascii_case(&identity)) {
            return Err(AuthError::IdentityMismatch(identity, other.to_string()));
        }

        Ok(Self {
            keys: parsed,
            identity,
        })
    }

    /// Permission letters in R, W, A order.
    pub fn permissions(&self) -> String {
        self.keys.keys().map(|p| p.as_char()).collect()
    }

    /// Whether a key for `perm` was supplied.
    pub fn has_permission(&self, perm: Permission) -> bool {
        self.keys.contains_key(&perm)
    }

    /// Produces the headers for a connection attempt stamped with the current time.
    pub fn authenticate(&self, session_uuid: Option<&str>) -> AuthHeaders {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        self.authenticate_at(&timestamp, session_uuid)
    }

    /// Produces the headers for an explicit timestamp.
    pub fn authenticate_at(&self, security_timestamp: &str, session_uuid: Option<&str>) -> AuthHeaders {
        let payload = AuthPayload {
            identity: self.identity.clone(),
            permissions: self.permissions(),
            security_timestamp: security_timestamp.to_string(),
            session_uuid: session_uuid.map(str::to_string),
        };
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_string(&payload).unwrap_or_default();

        let mut combined = [0u8; 32];
        for key in self.keys.values() {
            for (acc, byte) in combined.iter_mut().zip(key.sign(json.as_bytes())) {
                *acc ^= byte;
            }
        }

        AuthHeaders {
            payload_base64: general_purpose::STANDARD.encode(json.as_bytes()),
            payload_hmac: hex::encode(combined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ: &str = "R-0123456789abcdef-00112233445566778899aabbccddeeff";
    const WRITE: &str = "W-0123456789abcdef-ffeeddccbbaa99887766554433221100";
    const ADMIN: &str = "A-0123456789abcdef-0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";

    #[test]
    fn parses_a_well_formed_key() {
        let key = AuthKey::parse(READ).unwrap();
        assert_eq!(key.perm, Permission::Read);
        assert_eq!(key.identity, "0123456789abcdef");
    }

    #[test]
    fn rejects_bad_keys() {
        assert_eq!(AuthKey::parse("R-abc"), Err(AuthError::InvalidFormat));
        assert_eq!(
            AuthKey::parse("X-abc-def0"),
            Err(AuthError::InvalidPermission("X".into()))
        );
        assert_eq!(AuthKey::parse("R-xyz-00"), Err(AuthError::InvalidIdentity));
        assert_eq!(AuthKey::parse("R-abc-0g"), Err(AuthError::InvalidSecret));
    }

    #[test]
    fn permissions_are_ordered_and_deduplicated() {
        let auth = Authenticator::new(&[ADMIN, WRITE, READ, READ]).unwrap();
        assert_eq!(auth.permissions(), "RWA");
        assert!(auth.has_permission(Permission::Write));
    }

    #[test]
    fn mixed_identities_are_rejected() {
        let other = "W-fedcba9876543210-00";
        assert!(matches!(
            Authenticator::new(&[READ, other]),
            Err(AuthError::IdentityMismatch(_, _))
        ));
        assert_eq!(Authenticator::new::<&str>(&[]).unwrap_err(), AuthError::NoKeys);
    }

    #[test]
    fn hmac_is_the_xor_of_each_key_signature() {
        let ts = "2017-03-01T12:00:00Z";
        let read = Authenticator::new(&[READ]).unwrap();
        let write = Authenticator::new(&[WRITE]).unwrap();
        let both = Authenticator::new(&[READ, WRITE]).unwrap();

        let headers = both.authenticate_at(ts, None);
        let payload = general_purpose::STANDARD.decode(&headers.payload_base64).unwrap();

        let r = AuthKey::parse(READ).unwrap().sign(&payload);
        let w = AuthKey::parse(WRITE).unwrap().sign(&payload);
        let expected: Vec<u8> = r.iter().zip(w.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(headers.payload_hmac, hex::encode(expected));

        // A single key signs with exactly its own HMAC.
        let single = read.authenticate_at(ts, None);
        let single_payload = general_purpose::STANDARD.decode(&single.payload_base64).unwrap();
        assert_eq!(single.payload_hmac, hex::encode(AuthKey::parse(READ).unwrap().sign(&single_payload)));
        assert_ne!(write.authenticate_at(ts, None).payload_hmac, single.payload_hmac);
    }

    #[test]
    fn payload_round_trips_through_the_header() {
        let auth = Authenticator::new(&[READ, WRITE]).unwrap();
        let headers = auth.authenticate(Some("session-1"));
        let payload = AuthPayload::from_header(&headers.payload_base64).unwrap();
        assert_eq!(payload.identity, "0123456789abcdef");
        assert_eq!(payload.permissions, "RW");
        assert_eq!(payload.session_uuid.as_deref(), Some("session-1"));
        assert!(payload.security_timestamp.ends_with('Z'));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let key = AuthKey::parse(READ).unwrap();
        assert!(!format!("{:?}", key).contains("00112233"));
    }
}
