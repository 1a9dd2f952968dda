// marketplace/src/services/auth_service.rs

//! Password hashing, session tokens (JWT) and random secrets.

use crate::errors::AppError;
use crate::models::UserRole;
use argon2::{
  password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

pub const JWT_ISSUER: &str = "farmlink";
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn check_password_policy(password: &str) -> Result<(), AppError> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(AppError::Validation(format!(
      "Password must be at least {} characters long.",
      MIN_PASSWORD_LEN
    )));
  }
  Ok(())
}

#[instrument(name = "auth_service::hash_password", skip(password), err(Display))]
pub fn hash_password(password: &str) -> Result<String, AppError> {
  if password.is_empty() {
    return Err(AppError::Validation("Password cannot be empty.".to_string()));
  }

  let salt = SaltString::generate(&mut OsRng);
  match Argon2::default().hash_password(password.as_bytes(), &salt) {
    Ok(hash) => {
      debug!("Password hashed.");
      Ok(hash.to_string())
    }
    Err(argon_err) => {
      error!(error = %argon_err, "Argon2 password hashing failed.");
      Err(AppError::Internal(format!("Password hashing failed: {}", argon_err)))
    }
  }
}

/// `Ok(false)` on a wrong password; errors only for unusable stored hashes.
#[instrument(name = "auth_service::verify_password", skip_all, err(Display))]
pub fn verify_password(stored_hash: &str, provided_password: &str) -> Result<bool, AppError> {
  if provided_password.is_empty() {
    return Ok(false);
  }
  let parsed_hash = match PasswordHash::new(stored_hash) {
    Ok(ph) => ph,
    Err(parse_err) => {
      error!(error = %parse_err, "Stored password hash could not be parsed.");
      return Err(AppError::Internal(format!("Invalid stored password hash: {}", parse_err)));
    }
  };

  match Argon2::default().verify_password(provided_password.as_bytes(), &parsed_hash) {
    Ok(()) => Ok(true),
    Err(argon2::password_hash::Error::Password) => {
      debug!("Password mismatch.");
      Ok(false)
    }
    Err(other) => {
      error!(error = %other, "Argon2 verification error.");
      Err(AppError::Internal(format!("Password verification failed: {}", other)))
    }
  }
}

static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Runs a full Argon2 verification against a throwaway hash so a sign-in for an
/// unknown email costs as much as one with a wrong password. Always `false`.
pub fn verify_dummy_password(provided_password: &str) -> bool {
  let dummy = DUMMY_HASH.get_or_init(|| hash_password(&random_hex(16)).ok());
  if let Some(hash) = dummy {
    if let Err(e) = verify_password(hash, provided_password) {
      warn!(error = %e, "Dummy password verification failed.");
    }
  }
  false
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  pub sub: Uuid,
  pub role: UserRole,
  pub iat: i64,
  pub exp: i64,
  pub iss: String,
}

impl Claims {
  pub fn new(user_id: Uuid, role: UserRole, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
    let iat = issued_at.timestamp();
    Self {
      sub: user_id,
      role,
      iat,
      exp: iat + ttl.as_secs() as i64,
      iss: JWT_ISSUER.to_string(),
    }
  }
}

pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, AppError> {
  Ok(encode(
    &Header::new(Algorithm::HS256),
    claims,
    &EncodingKey::from_secret(secret.as_bytes()),
  )?)
}

#[instrument(name = "auth_service::issue_jwt", skip(secret), fields(user_id = %user_id, role = role.as_str()))]
pub fn issue_jwt(user_id: Uuid, role: UserRole, secret: &str, ttl: Duration) -> Result<String, AppError> {
  encode_claims(&Claims::new(user_id, role, Utc::now(), ttl), secret)
}

/// Checks signature, expiry and issuer. Every failure is reported as `Auth`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
  let mut validation = Validation::new(Algorithm::HS256);
  validation.set_issuer(&[JWT_ISSUER]);
  validation.leeway = 0;
  match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
    Ok(data) => Ok(data.claims),
    Err(jwt_err) => {
      warn!(error = %jwt_err, "Rejected session token.");
      Err(AppError::Auth("Invalid or expired session token.".to_string()))
    }
  }
}

/// `byte_len` bytes from the OS RNG, hex encoded.
pub fn random_hex(byte_len: usize) -> String {
  let mut bytes = vec![0u8; byte_len];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "unit-test-secret-0123456789";

  #[test]
  fn hash_and_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password(&hash, "correct horse").unwrap());
    assert!(!verify_password(&hash, "wrong horse").unwrap());
    assert!(!verify_password(&hash, "").unwrap());
  }

  #[test]
  fn dummy_verification_never_matches() {
    assert!(!verify_dummy_password("correct horse"));
    assert!(!verify_dummy_password(""));
    assert!(DUMMY_HASH.get().and_then(|h| h.as_deref()).is_some_and(|h| h.starts_with("$argon2")));
  }

  #[test]
  fn garbage_hash_is_internal_error() {
    assert!(matches!(verify_password("not-a-hash", "pw"), Err(AppError::Internal(_))));
  }

  #[test]
  fn password_policy() {
    assert!(check_password_policy("short").is_err());
    assert!(check_password_policy("longenough").is_ok());
  }

  #[test]
  fn jwt_round_trip_keeps_claims() {
    let user_id = Uuid::new_v4();
    let token = issue_jwt(user_id, UserRole::Partner, SECRET, Duration::from_secs(3600)).unwrap();
    let claims = verify_jwt(&token, SECRET).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, UserRole::Partner);
    assert_eq!(claims.iss, JWT_ISSUER);
    assert_eq!(claims.exp - claims.iat, 3600);
  }

  #[test]
  fn jwt_rejects_wrong_secret_expiry_and_issuer() {
    let user_id = Uuid::new_v4();
    let token = issue_jwt(user_id, UserRole::Buyer, SECRET, Duration::from_secs(60)).unwrap();
    assert!(matches!(verify_jwt(&token, "another-secret-0123456789"), Err(AppError::Auth(_))));

    let stale = Claims::new(user_id, UserRole::Buyer, Utc::now() - chrono::Duration::hours(2), Duration::from_secs(60));
    let stale_token = encode_claims(&stale, SECRET).unwrap();
    assert!(matches!(verify_jwt(&stale_token, SECRET), Err(AppError::Auth(_))));

    let mut foreign = Claims::new(user_id, UserRole::Buyer, Utc::now(), Duration::from_secs(60));
    foreign.iss = "someone-else".to_string();
    let foreign_token = encode_claims(&foreign, SECRET).unwrap();
    assert!(verify_jwt(&foreign_token, SECRET).is_err());
  }

  #[test]
  fn random_hex_has_expected_length() {
    let a = random_hex(32);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, random_hex(32));
  }
}
