//! Relying party flow controller
//!
//! Orchestrates the four-step protocol: register-challenge →
//! register-response → login-challenge → login-response. A session moves
//! from idle to a pending ceremony when a challenge is issued and back to
//! idle when the response consumes it; a response with no pending ceremony
//! always fails. The pending ceremony is consumed *before* verification is
//! awaited, so a concurrent duplicate can never reuse the same challenge,
//! and it stays consumed whether verification succeeds or not.

use crate::challenge::{Challenge, ChallengeIssuer};
use crate::credentials::{Credential, CredentialRepository};
use crate::error::{RpError, RpResult};
use crate::identity::UserId;
use crate::session::{CeremonyPurpose, PendingCeremony, SessionStore};
use crate::verify::{AuthenticationResponse, RegistrationResponse, VerificationGateway};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Challenge grant returned by `register-challenge`.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeGrant {
    pub challenge: Challenge,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

/// Allow-list entry handed to the client authenticator so it can filter
/// to the credentials this identity actually registered.
#[derive(Debug, Clone, Serialize)]
pub struct AllowCredential {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub transports: Vec<String>,
}

/// Challenge grant returned by `login-challenge`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginChallengeGrant {
    pub challenge: Challenge,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<AllowCredential>,
}

/// The relying party core. All collaborators are injected, so tests swap in
/// fakes and deployments swap in persistent stores without touching the flow.
pub struct RelyingParty {
    sessions: Arc<dyn SessionStore>,
    credentials: Arc<dyn CredentialRepository>,
    gateway: VerificationGateway,
    issuer: ChallengeIssuer,
}

impl RelyingParty {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialRepository>,
        gateway: VerificationGateway,
    ) -> Self {
        Self {
            sessions,
            credentials,
            gateway,
            issuer: ChallengeIssuer::new(),
        }
    }

    /// Issue a registration challenge bound to this session.
    ///
    /// No check that the identity is unregistered: re-registration under an
    /// existing account is allowed and appends a further credential
    /// (multi-device enrollment).
    pub async fn register_challenge(
        &self,
        session_id: &str,
        account: &str,
    ) -> RpResult<ChallengeGrant> {
        let user_id = UserId::derive(account);
        let challenge = self.issuer.issue();

        self.sessions
            .begin_ceremony(
                session_id,
                CeremonyPurpose::Register,
                user_id.clone(),
                challenge.clone(),
            )
            .await?;

        info!(user = %user_id, "registration challenge issued");
        Ok(ChallengeGrant { challenge, user_id })
    }

    /// Verify an attestation response and store the new credential.
    pub async fn register_response(
        &self,
        session_id: &str,
        response: &RegistrationResponse,
    ) -> RpResult<()> {
        let pending = self
            .take_pending(session_id, CeremonyPurpose::Register)
            .await?;

        let verified = self
            .gateway
            .verify_registration(response, &pending.challenge)
            .await?;

        self.credentials
            .add_credential(
                &pending.user_id,
                Credential {
                    credential_id: verified.credential_id,
                    public_key: verified.public_key,
                    counter: verified.counter,
                    transports: verified.transports,
                },
            )
            .await?;

        info!(user = %pending.user_id, "credential registered");
        Ok(())
    }

    /// Issue a login challenge, failing before any challenge is created when
    /// the account has nothing registered.
    pub async fn login_challenge(
        &self,
        session_id: &str,
        account: &str,
    ) -> RpResult<LoginChallengeGrant> {
        let user_id = UserId::derive(account);

        let credentials = self.credentials.list_credentials(&user_id).await?;
        if credentials.is_empty() {
            return Err(RpError::UnregisteredAccount);
        }

        let challenge = self.issuer.issue();
        self.sessions
            .begin_ceremony(
                session_id,
                CeremonyPurpose::Login,
                user_id.clone(),
                challenge.clone(),
            )
            .await?;

        let allow_credentials = credentials
            .into_iter()
            .map(|c| AllowCredential {
                id: c.credential_id,
                ty: "public-key",
                transports: if c.transports.is_empty() {
                    vec!["internal".to_string()]
                } else {
                    c.transports
                },
            })
            .collect();

        info!(user = %user_id, "login challenge issued");
        Ok(LoginChallengeGrant {
            challenge,
            user_id,
            allow_credentials,
        })
    }

    /// Verify an assertion response against the stored credential and
    /// persist the advanced signature counter.
    pub async fn login_response(
        &self,
        session_id: &str,
        response: &AuthenticationResponse,
    ) -> RpResult<()> {
        let pending = self.take_pending(session_id, CeremonyPurpose::Login).await?;

        // The lookup is scoped to the challenged identity: a credential id
        // belonging to some other identity fails here even if its signature
        // would verify against that identity's key.
        let anchor = self
            .credentials
            .find_credential(&pending.user_id, &response.id)
            .await?
            .ok_or(RpError::UnknownCredential)?;

        let verified = self
            .gateway
            .verify_authentication(response, &pending.challenge, &anchor)
            .await?;

        self.credentials
            .update_counter(&pending.user_id, &anchor.credential_id, verified.counter)
            .await?;

        info!(user = %pending.user_id, "login verified");
        Ok(())
    }

    /// Consume the session's pending ceremony, requiring the right purpose.
    /// Consumption happens regardless of what the response turns out to be:
    /// a challenge answered by the wrong ceremony type is burned too.
    async fn take_pending(
        &self,
        session_id: &str,
        purpose: CeremonyPurpose,
    ) -> RpResult<PendingCeremony> {
        let pending = self
            .sessions
            .consume_pending(session_id)
            .await?
            .ok_or(RpError::SessionExpiredOrAlreadyUsed)?;

        if pending.purpose != purpose {
            return Err(RpError::SessionExpiredOrAlreadyUsed);
        }
        Ok(pending)
    }
}
