//! Session Types and Structures

use crate::auth::Identity;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bytes of OS randomness in a session token
const TOKEN_BYTES: usize = 32;

/// Hex characters of the SHA-256 digest kept as a token fingerprint
const FINGERPRINT_LEN: usize = 16;

/// Opaque session token
///
/// `Debug` and `Display` show only the fingerprint so tokens cannot leak
/// through logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh 256-bit token, base64url without padding
    pub fn generate() -> Self {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable, non-reversible identifier suitable for audit records and logs
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Fingerprint of a raw presented token
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Transport connection a session was issued on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A live authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    /// Name of the owning identity
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub connection_id: ConnectionId,
}

impl Session {
    /// A session is dead from the instant it reaches its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// A validated session together with the current state of its identity
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: Session,
    pub identity: Identity,
}

impl SessionContext {
    pub fn new(session: Session, identity: Identity) -> Self {
        Self { session, identity }
    }

    pub fn identity_name(&self) -> &str {
        &self.identity.name
    }

    pub fn token_fingerprint(&self) -> String {
        self.session.token.fingerprint()
    }
}
