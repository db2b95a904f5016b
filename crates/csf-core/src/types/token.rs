use std::fmt::{Debug, Display};

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Per-frame secret minted by the host and handed to the frame during the handshake.
///
/// Every later message from the frame must echo it back.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Number of random bytes behind a token.
    pub const ENTROPY_BYTES: usize = 32;

    /// Mint a fresh token from the thread-local RNG.
    pub fn generate() -> Self {
        let bytes: [u8; Self::ENTROPY_BYTES] = rand::random();
        SessionToken(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Compare against an untrusted candidate in constant time.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Public client key identifying the merchant integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Returns `None` for a blank key.
    pub fn new(key: impl AsRef<str>) -> Option<Self> {
        let key = key.as_ref().trim();
        (!key.is_empty()).then(|| ClientKey(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
