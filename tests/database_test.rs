//! SQLite credential repository tests

use passkey_rp::database::SqliteCredentialRepository;
use passkey_rp::{Credential, CredentialRepository, RpError, UserId};
use uuid::Uuid;

/// Fresh on-disk database per test; sqlite in-memory databases do not
/// survive pooled connections.
fn temp_db_url() -> String {
    let path = std::env::temp_dir().join(format!("passkey-rp-test-{}.db", Uuid::new_v4()));
    format!("sqlite://{}", path.display())
}

fn credential(id: &str) -> Credential {
    Credential {
        credential_id: id.to_string(),
        public_key: "cHVibGljLWtleQ".to_string(),
        counter: 0,
        transports: vec!["usb".to_string(), "nfc".to_string()],
    }
}

#[tokio::test]
async fn add_then_list_round_trips() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let alice = UserId::derive("alice");

    repo.add_credential(&alice, credential("cred-1")).await.unwrap();

    let listed = repo.list_credentials(&alice).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], credential("cred-1"));
}

#[tokio::test]
async fn unknown_identity_lists_empty() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let listed = repo.list_credentials(&UserId::derive("ghost")).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn duplicate_id_is_rejected_across_identities() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();

    repo.add_credential(&UserId::derive("alice"), credential("shared"))
        .await
        .unwrap();
    let result = repo
        .add_credential(&UserId::derive("bob"), credential("shared"))
        .await;
    assert!(matches!(result, Err(RpError::DuplicateCredential)));
}

#[tokio::test]
async fn find_is_scoped_to_the_identity() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let alice = UserId::derive("alice");

    repo.add_credential(&alice, credential("cred-1")).await.unwrap();

    assert!(repo
        .find_credential(&alice, "cred-1")
        .await
        .unwrap()
        .is_some());
    assert!(repo
        .find_credential(&UserId::derive("bob"), "cred-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn counter_advances_and_regression_is_rejected() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let alice = UserId::derive("alice");
    repo.add_credential(&alice, credential("cred-1")).await.unwrap();

    repo.update_counter(&alice, "cred-1", 9).await.unwrap();
    let stored = repo.find_credential(&alice, "cred-1").await.unwrap().unwrap();
    assert_eq!(stored.counter, 9);

    let result = repo.update_counter(&alice, "cred-1", 3).await;
    assert!(matches!(result, Err(RpError::CounterRegression)));
}

#[tokio::test]
async fn zero_counter_authenticators_are_tolerated() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let alice = UserId::derive("alice");
    repo.add_credential(&alice, credential("cred-1")).await.unwrap();

    // Stored and reported both zero: authenticator has no counter.
    repo.update_counter(&alice, "cred-1", 0).await.unwrap();
    let stored = repo.find_credential(&alice, "cred-1").await.unwrap().unwrap();
    assert_eq!(stored.counter, 0);
}

#[tokio::test]
async fn updating_a_missing_credential_fails() {
    let repo = SqliteCredentialRepository::connect(&temp_db_url()).await.unwrap();
    let result = repo
        .update_counter(&UserId::derive("alice"), "missing", 1)
        .await;
    assert!(matches!(result, Err(RpError::UnknownCredential)));
}

#[tokio::test]
async fn credentials_survive_a_reconnect() {
    let url = temp_db_url();
    let alice = UserId::derive("alice");

    {
        let repo = SqliteCredentialRepository::connect(&url).await.unwrap();
        repo.add_credential(&alice, credential("cred-1")).await.unwrap();
    }

    let repo = SqliteCredentialRepository::connect(&url).await.unwrap();
    let listed = repo.list_credentials(&alice).await.unwrap();
    assert_eq!(listed.len(), 1);
}
