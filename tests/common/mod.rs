//! Common test utilities: a wired relying party and simulated
//! authenticator payloads.

#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use passkey_rp::verify::{
    AssertionData, AttestationData, AuthenticationResponse, RegistrationResponse,
};
use passkey_rp::{
    Challenge, ClientBindingVerifier, MemoryCredentialRepository, MemorySessionStore,
    RelyingParty, VerificationGateway,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const ORIGIN: &str = "http://localhost:3001";
pub const RP_ID: &str = "localhost";

/// A relying party plus handles to its injected stores, so tests can
/// inspect state the flow controller mutates.
pub struct TestRp {
    pub rp: RelyingParty,
    pub sessions: Arc<MemorySessionStore>,
    pub credentials: Arc<MemoryCredentialRepository>,
}

pub fn test_rp() -> TestRp {
    test_rp_with_ttl(Duration::from_secs(60))
}

pub fn test_rp_with_ttl(ttl: Duration) -> TestRp {
    let sessions = Arc::new(MemorySessionStore::new(ttl));
    let credentials = Arc::new(MemoryCredentialRepository::new());
    let gateway = VerificationGateway::new(
        Arc::new(ClientBindingVerifier::new()),
        ORIGIN.to_string(),
        RP_ID.to_string(),
    );
    let rp = RelyingParty::new(sessions.clone(), credentials.clone(), gateway);
    TestRp {
        rp,
        sessions,
        credentials,
    }
}

pub fn credential_id(seed: &str) -> String {
    URL_SAFE_NO_PAD.encode(seed.as_bytes())
}

fn client_data(ty: &str, challenge: &str, origin: &str) -> String {
    let json = serde_json::json!({
        "type": ty,
        "challenge": challenge,
        "origin": origin,
    });
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json).unwrap())
}

fn authenticator_data(rp_id: &str, counter: u32) -> String {
    let mut bytes = Vec::with_capacity(37);
    bytes.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    bytes.push(0x01); // user present
    bytes.extend_from_slice(&counter.to_be_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A simulated attestation response referencing the given challenge.
pub fn attestation(challenge: &Challenge, cred_id: &str) -> RegistrationResponse {
    attestation_from(challenge.as_str(), cred_id, ORIGIN)
}

pub fn attestation_from(challenge: &str, cred_id: &str, origin: &str) -> RegistrationResponse {
    RegistrationResponse {
        id: cred_id.to_string(),
        raw_id: cred_id.to_string(),
        ty: "public-key".to_string(),
        response: AttestationData {
            client_data_json: client_data("webauthn.create", challenge, origin),
            attestation_object: URL_SAFE_NO_PAD.encode(b"attestation-object"),
            transports: vec!["internal".to_string()],
        },
    }
}

/// A simulated assertion response with the authenticator-reported counter.
pub fn assertion(challenge: &Challenge, cred_id: &str, counter: u32) -> AuthenticationResponse {
    assertion_from(challenge.as_str(), cred_id, counter)
}

pub fn assertion_from(challenge: &str, cred_id: &str, counter: u32) -> AuthenticationResponse {
    AuthenticationResponse {
        id: cred_id.to_string(),
        raw_id: cred_id.to_string(),
        ty: "public-key".to_string(),
        response: AssertionData {
            client_data_json: client_data("webauthn.get", challenge, ORIGIN),
            authenticator_data: authenticator_data(RP_ID, counter),
            signature: URL_SAFE_NO_PAD.encode(b"signature"),
            user_handle: None,
        },
    }
}
