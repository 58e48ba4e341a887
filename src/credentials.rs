//! Credential storage
//!
//! Maps an identity to the set of public-key credentials registered for it.
//! Credentials are only ever added through a verified registration and only
//! ever mutated (counter update) through a verified authentication; both
//! paths live in the flow controller.

use crate::error::{RpError, RpResult};
use crate::identity::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A registered public-key credential.
///
/// `credential_id` and `public_key` are opaque base64url text: the
/// authenticator assigns the id, and the key material is whatever encoding
/// the configured [`CredentialVerifier`](crate::verify::CredentialVerifier)
/// produces and consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub credential_id: String,
    pub public_key: String,
    pub counter: u32,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Durable identity → credentials mapping.
///
/// `add_credential` and `update_counter` must be atomic check-then-write
/// operations so two concurrent requests cannot double-register an id or
/// both win a counter race.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// All credentials registered for an identity. An unknown identity is an
    /// empty list, not an error.
    async fn list_credentials(&self, user: &UserId) -> RpResult<Vec<Credential>>;

    /// Append a credential, creating the identity's collection if absent.
    /// Credential ids are globally unique: a collision with any identity's
    /// credential fails with [`RpError::DuplicateCredential`].
    async fn add_credential(&self, user: &UserId, credential: Credential) -> RpResult<()>;

    async fn find_credential(
        &self,
        user: &UserId,
        credential_id: &str,
    ) -> RpResult<Option<Credential>>;

    /// Persist the counter reported by a verified authentication.
    ///
    /// Counter policy: a stored and reported counter of zero means the
    /// authenticator does not implement a counter, so the check is skipped.
    /// Otherwise the counter must strictly increase; anything else fails
    /// with [`RpError::CounterRegression`] (possible cloned credential).
    async fn update_counter(
        &self,
        user: &UserId,
        credential_id: &str,
        new_counter: u32,
    ) -> RpResult<()>;
}

/// Applies the counter policy shared by every repository implementation.
pub(crate) fn check_counter(stored: u32, reported: u32) -> RpResult<()> {
    if stored == 0 && reported == 0 {
        return Ok(());
    }
    if reported <= stored {
        return Err(RpError::CounterRegression);
    }
    Ok(())
}

/// Process-lifetime repository backed by a lock-guarded map. Used by tests
/// and `--in-memory` deployments; the SQLite repository in
/// [`crate::database`] is the durable counterpart.
#[derive(Default)]
pub struct MemoryCredentialRepository {
    entries: RwLock<HashMap<UserId, Vec<Credential>>>,
}

impl MemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn list_credentials(&self, user: &UserId) -> RpResult<Vec<Credential>> {
        let entries = self.entries.read().await;
        Ok(entries.get(user).cloned().unwrap_or_default())
    }

    async fn add_credential(&self, user: &UserId, credential: Credential) -> RpResult<()> {
        // Write lock held across the global scan and the append.
        let mut entries = self.entries.write().await;
        let duplicate = entries
            .values()
            .flatten()
            .any(|c| c.credential_id == credential.credential_id);
        if duplicate {
            return Err(RpError::DuplicateCredential);
        }
        entries.entry(user.clone()).or_default().push(credential);
        Ok(())
    }

    async fn find_credential(
        &self,
        user: &UserId,
        credential_id: &str,
    ) -> RpResult<Option<Credential>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(user)
            .and_then(|creds| creds.iter().find(|c| c.credential_id == credential_id))
            .cloned())
    }

    async fn update_counter(
        &self,
        user: &UserId,
        credential_id: &str,
        new_counter: u32,
    ) -> RpResult<()> {
        let mut entries = self.entries.write().await;
        let credential = entries
            .get_mut(user)
            .and_then(|creds| creds.iter_mut().find(|c| c.credential_id == credential_id))
            .ok_or(RpError::UnknownCredential)?;

        check_counter(credential.counter, new_counter)?;
        if new_counter > credential.counter {
            credential.counter = new_counter;
        }
        Ok(())
    }
}
