// marketplace/src/services/token_store.rs

//! In-memory store for single-use verification and password-reset tokens.
//!
//! Tokens live only in this process. A restart invalidates every outstanding
//! link, which users recover from with "resend verification" or "forgot password".

use crate::services::auth_service::random_hex;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
  EmailVerification,
  PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
  #[error("token is unknown or has already been used")]
  Unknown,
  #[error("token was issued for a different purpose")]
  PurposeMismatch,
  #[error("token has expired")]
  Expired,
}

#[derive(Debug, Clone)]
struct TokenEntry {
  user_id: Uuid,
  purpose: TokenPurpose,
  expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct VerificationTokenStore {
  entries: Mutex<HashMap<String, TokenEntry>>,
}

impl VerificationTokenStore {
  pub fn new() -> Self {
    Self::default()
  }

  #[instrument(name = "token_store::issue", skip(self), fields(user_id = %user_id, purpose = ?purpose))]
  pub fn issue(&self, user_id: Uuid, purpose: TokenPurpose, ttl: Duration) -> String {
    self.issue_at(user_id, purpose, ttl, Utc::now())
  }

  pub fn issue_at(&self, user_id: Uuid, purpose: TokenPurpose, ttl: Duration, now: DateTime<Utc>) -> String {
    let token = random_hex(TOKEN_BYTES);
    let expires_at = now + chrono::Duration::seconds(ttl.as_secs() as i64);
    self.entries.lock().insert(
      token.clone(),
      TokenEntry {
        user_id,
        purpose,
        expires_at,
      },
    );
    debug!(%expires_at, "Token issued.");
    token
  }

  /// Takes the token out of the store. A purpose mismatch leaves it in place
  /// so the legitimate flow can still use it.
  #[instrument(name = "token_store::consume", skip(self, token), fields(purpose = ?purpose))]
  pub fn consume(&self, token: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
    let mut entries = self.entries.lock();
    let entry = entries.remove(token).ok_or(TokenError::Unknown)?;
    if entry.purpose != purpose {
      entries.insert(token.to_string(), entry);
      return Err(TokenError::PurposeMismatch);
    }
    if now >= entry.expires_at {
      return Err(TokenError::Expired);
    }
    Ok(entry.user_id)
  }

  /// Drops every outstanding token of `purpose` for the user. Returns how many were removed.
  pub fn revoke_for_user(&self, user_id: Uuid, purpose: TokenPurpose) -> usize {
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, e| !(e.user_id == user_id && e.purpose == purpose));
    before - entries.len()
  }

  pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, e| e.expires_at > now);
    before - entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Periodically removes expired tokens.
  pub fn spawn_purger(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let purged = self.purge_expired(Utc::now());
        if purged > 0 {
          info!(purged, remaining = self.len(), "Purged expired verification tokens.");
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HOUR: Duration = Duration::from_secs(3600);

  #[test]
  fn tokens_are_long_random_hex() {
    let store = VerificationTokenStore::new();
    let a = store.issue(Uuid::new_v4(), TokenPurpose::EmailVerification, HOUR);
    let b = store.issue(Uuid::new_v4(), TokenPurpose::EmailVerification, HOUR);
    assert_eq!(a.len(), 64);
    assert_ne!(a, b);
    assert_eq!(store.len(), 2);
  }

  #[test]
  fn consume_is_single_use() {
    let store = VerificationTokenStore::new();
    let user = Uuid::new_v4();
    let now = Utc::now();
    let token = store.issue_at(user, TokenPurpose::EmailVerification, HOUR, now);

    assert_eq!(store.consume(&token, TokenPurpose::EmailVerification, now), Ok(user));
    assert_eq!(
      store.consume(&token, TokenPurpose::EmailVerification, now),
      Err(TokenError::Unknown)
    );
    assert!(store.is_empty());
  }

  #[test]
  fn unknown_token_is_rejected() {
    let store = VerificationTokenStore::new();
    assert_eq!(
      store.consume("deadbeef", TokenPurpose::PasswordReset, Utc::now()),
      Err(TokenError::Unknown)
    );
  }

  #[test]
  fn purpose_mismatch_keeps_the_token() {
    let store = VerificationTokenStore::new();
    let user = Uuid::new_v4();
    let now = Utc::now();
    let token = store.issue_at(user, TokenPurpose::PasswordReset, HOUR, now);

    assert_eq!(
      store.consume(&token, TokenPurpose::EmailVerification, now),
      Err(TokenError::PurposeMismatch)
    );
    assert_eq!(store.consume(&token, TokenPurpose::PasswordReset, now), Ok(user));
  }

  #[test]
  fn expired_token_is_rejected_and_removed() {
    let store = VerificationTokenStore::new();
    let issued = Utc::now();
    let token = store.issue_at(Uuid::new_v4(), TokenPurpose::EmailVerification, HOUR, issued);
    let at_expiry = issued + chrono::Duration::seconds(3600);

    assert_eq!(
      store.consume(&token, TokenPurpose::EmailVerification, at_expiry),
      Err(TokenError::Expired)
    );
    assert!(store.is_empty());
  }

  #[test]
  fn revoke_only_touches_matching_user_and_purpose() {
    let store = VerificationTokenStore::new();
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    store.issue(user, TokenPurpose::PasswordReset, HOUR);
    store.issue(user, TokenPurpose::PasswordReset, HOUR);
    let keep = store.issue(user, TokenPurpose::EmailVerification, HOUR);
    store.issue(other, TokenPurpose::PasswordReset, HOUR);

    assert_eq!(store.revoke_for_user(user, TokenPurpose::PasswordReset), 2);
    assert_eq!(store.len(), 2);
    assert_eq!(store.consume(&keep, TokenPurpose::EmailVerification, Utc::now()), Ok(user));
  }

  #[test]
  fn purge_removes_only_expired() {
    let store = VerificationTokenStore::new();
    let now = Utc::now();
    store.issue_at(Uuid::new_v4(), TokenPurpose::EmailVerification, Duration::from_secs(10), now);
    store.issue_at(Uuid::new_v4(), TokenPurpose::EmailVerification, HOUR, now);

    let later = now + chrono::Duration::seconds(60);
    assert_eq!(store.purge_expired(later), 1);
    assert_eq!(store.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn purger_task_runs_on_interval() {
    let store = Arc::new(VerificationTokenStore::new());
    store.issue_at(
      Uuid::new_v4(),
      TokenPurpose::PasswordReset,
      Duration::from_secs(1),
      Utc::now() - chrono::Duration::hours(1),
    );
    let handle = store.clone().spawn_purger(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    assert!(store.is_empty());
    handle.abort();
  }
}
