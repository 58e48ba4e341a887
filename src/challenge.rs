//! Challenge issuance

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a challenge. 32 bytes gives 256 bits of
/// entropy, enough that reuse within the lifetime of a deployment is
/// negligible without any uniqueness ledger.
pub const CHALLENGE_BYTES: usize = 32;

/// A single-use random challenge, carried as unpadded URL-safe base64 text.
///
/// The same textual form is sent to the client, embedded by the browser in
/// `clientDataJSON`, and compared verbatim during verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge(String);

impl Challenge {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-encoded challenge (tests, storage round-trips).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }
}

/// Produces fresh challenges from the OS CSPRNG.
#[derive(Debug, Clone, Default)]
pub struct ChallengeIssuer;

impl ChallengeIssuer {
    pub fn new() -> Self {
        Self
    }

    /// Issue a fresh challenge. No side effects beyond consuming randomness.
    pub fn issue(&self) -> Challenge {
        let mut bytes = [0u8; CHALLENGE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Challenge(URL_SAFE_NO_PAD.encode(bytes))
    }
}
