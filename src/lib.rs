//! passkey-rp - WebAuthn relying party
//!
//! Issues registration and login challenges, binds them to a session, and
//! verifies the signed authenticator responses against stored public-key
//! material. Challenges are single-use, sessions expire, and signature
//! counters are checked for regressions.

pub mod challenge;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod flow;
pub mod identity;
pub mod session;
pub mod verify;
pub mod web;

pub use challenge::{Challenge, ChallengeIssuer};
pub use config::RpConfig;
pub use credentials::{Credential, CredentialRepository, MemoryCredentialRepository};
pub use error::{RpError, RpResult};
pub use flow::RelyingParty;
pub use identity::UserId;
pub use session::{MemorySessionStore, SessionStore};
pub use verify::{ClientBindingVerifier, CredentialVerifier, VerificationGateway};

use std::sync::Arc;

/// Wire a relying party from configuration with in-memory stores and the
/// bundled binding verifier. Deployments needing persistence or a full
/// cryptographic verifier assemble [`RelyingParty`] by hand instead.
pub fn relying_party(config: &RpConfig) -> RelyingParty {
    let sessions = Arc::new(MemorySessionStore::new(config.challenge_ttl));
    let credentials = Arc::new(MemoryCredentialRepository::new());
    let gateway = VerificationGateway::new(
        Arc::new(ClientBindingVerifier::new()),
        config.rp_origin.clone(),
        config.rp_id.clone(),
    );
    RelyingParty::new(sessions, credentials, gateway)
}
