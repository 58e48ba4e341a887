//! Per-session ceremony state
//!
//! A session holds at most one pending ceremony: the challenge we issued and
//! the identity it was issued for. The record is overwritten whenever a new
//! challenge is issued and consumed exactly once when a response arrives,
//! which is what makes challenges single-use.

use crate::challenge::Challenge;
use crate::error::{RpError, RpResult};
use crate::identity::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Which half of the protocol the pending challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyPurpose {
    Register,
    Login,
}

/// The challenge/identity pair bound to a session, awaiting a response.
#[derive(Debug, Clone)]
pub struct PendingCeremony {
    pub purpose: CeremonyPurpose,
    pub user_id: UserId,
    pub challenge: Challenge,
    pub issued_at: DateTime<Utc>,
}

/// Ephemeral per-session state.
///
/// Implementations must make `consume_pending` an atomic compare-and-take:
/// two concurrent responses for the same session must never both observe the
/// pending ceremony.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bind a freshly issued challenge to a session, creating the session
    /// record on first use and overwriting any prior pending ceremony.
    async fn begin_ceremony(
        &self,
        session_id: &str,
        purpose: CeremonyPurpose,
        user_id: UserId,
        challenge: Challenge,
    ) -> RpResult<()>;

    /// Take the pending ceremony, invalidating it.
    ///
    /// Returns `None` when the session exists but nothing is pending (already
    /// consumed, or past its time-to-live). Fails with
    /// [`RpError::SessionNotFound`] when the session was never seen.
    async fn consume_pending(&self, session_id: &str) -> RpResult<Option<PendingCeremony>>;

    /// Reap sessions whose pending ceremony has outlived the TTL.
    async fn cleanup_expired(&self);
}

#[derive(Debug, Default)]
struct SessionRecord {
    pending: Option<PendingCeremony>,
}

/// Process-lifetime session store backed by a lock-guarded map.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// A TTL too large for chrono's range clamps to the maximum, i.e. the
    /// pending ceremony never expires by age.
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }

    fn expired(&self, pending: &PendingCeremony) -> bool {
        Utc::now() - pending.issued_at > self.ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn begin_ceremony(
        &self,
        session_id: &str,
        purpose: CeremonyPurpose,
        user_id: UserId,
        challenge: Challenge,
    ) -> RpResult<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_default();
        record.pending = Some(PendingCeremony {
            purpose,
            user_id,
            challenge,
            issued_at: Utc::now(),
        });
        Ok(())
    }

    async fn consume_pending(&self, session_id: &str) -> RpResult<Option<PendingCeremony>> {
        // Write lock held across take() so two responses can't both win.
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or(RpError::SessionNotFound)?;

        match record.pending.take() {
            Some(pending) if self.expired(&pending) => Ok(None),
            other => Ok(other),
        }
    }

    async fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, record| match &record.pending {
            Some(pending) => Utc::now() - pending.issued_at <= self.ttl,
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeIssuer;
    use std::time::Duration as StdDuration;

    fn store() -> MemorySessionStore {
        MemorySessionStore::new(StdDuration::from_secs(60))
    }

    #[tokio::test]
    async fn consume_returns_the_latest_ceremony() {
        let store = store();
        let issuer = ChallengeIssuer::new();
        let user = UserId::derive("alice");

        let first = issuer.issue();
        let second = issuer.issue();
        store
            .begin_ceremony("s1", CeremonyPurpose::Register, user.clone(), first)
            .await
            .unwrap();
        store
            .begin_ceremony("s1", CeremonyPurpose::Login, user.clone(), second.clone())
            .await
            .unwrap();

        let pending = store.consume_pending("s1").await.unwrap().unwrap();
        assert_eq!(pending.challenge, second);
        assert_eq!(pending.purpose, CeremonyPurpose::Login);
        assert_eq!(pending.user_id, user);
    }

    #[tokio::test]
    async fn second_consume_finds_nothing() {
        let store = store();
        store
            .begin_ceremony(
                "s1",
                CeremonyPurpose::Register,
                UserId::derive("alice"),
                ChallengeIssuer::new().issue(),
            )
            .await
            .unwrap();

        assert!(store.consume_pending("s1").await.unwrap().is_some());
        assert!(store.consume_pending("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let result = store().consume_pending("nope").await;
        assert!(matches!(result, Err(RpError::SessionNotFound)));
    }

    #[tokio::test]
    async fn stale_ceremony_is_treated_as_absent() {
        let store = MemorySessionStore::new(StdDuration::from_millis(20));
        store
            .begin_ceremony(
                "s1",
                CeremonyPurpose::Login,
                UserId::derive("bob"),
                ChallengeIssuer::new().issue(),
            )
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(store.consume_pending("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_reaps_stale_records() {
        let store = MemorySessionStore::new(StdDuration::from_millis(20));
        store
            .begin_ceremony(
                "s1",
                CeremonyPurpose::Login,
                UserId::derive("bob"),
                ChallengeIssuer::new().issue(),
            )
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        store.cleanup_expired().await;

        // Record is gone entirely, so the session itself is unknown again.
        let result = store.consume_pending("s1").await;
        assert!(matches!(result, Err(RpError::SessionNotFound)));
    }

    #[tokio::test]
    async fn cleanup_drops_consumed_sessions() {
        let store = store();
        store
            .begin_ceremony(
                "s1",
                CeremonyPurpose::Register,
                UserId::derive("alice"),
                ChallengeIssuer::new().issue(),
            )
            .await
            .unwrap();

        assert!(store.consume_pending("s1").await.unwrap().is_some());
        store.cleanup_expired().await;

        // The consumed record does not linger as an empty session.
        let result = store.consume_pending("s1").await;
        assert!(matches!(result, Err(RpError::SessionNotFound)));
    }

    #[tokio::test]
    async fn an_oversized_ttl_clamps_to_never_expiring() {
        let store = MemorySessionStore::new(StdDuration::MAX);
        store
            .begin_ceremony(
                "s1",
                CeremonyPurpose::Register,
                UserId::derive("alice"),
                ChallengeIssuer::new().issue(),
            )
            .await
            .unwrap();

        assert!(store.consume_pending("s1").await.unwrap().is_some());
    }
}
