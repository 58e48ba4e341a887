//! Identity derivation from account strings

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Opaque stable identifier for an account.
///
/// Derived deterministically: the same account string always maps to the
/// same `UserId`, and the encoding is injective so distinct accounts can
/// never collide. The encoded form doubles as the `user.id` field sent to
/// the client authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Derive the identity for an account string.
    pub fn derive(account: &str) -> Self {
        Self(URL_SAFE_NO_PAD.encode(account.as_bytes()))
    }

    /// Wrap an already-encoded identity (e.g. read back from storage).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
