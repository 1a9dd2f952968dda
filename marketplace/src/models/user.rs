// marketplace/src/models/user.rs

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
  Farmer,
  Partner,
  Buyer,
  Admin,
}

impl UserRole {
  /// Farmers and partners wait for an admin; buyers can trade immediately.
  pub fn initial_status(&self) -> AccountStatus {
    match self {
      UserRole::Buyer | UserRole::Admin => AccountStatus::Active,
      UserRole::Farmer | UserRole::Partner => AccountStatus::Pending,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      UserRole::Farmer => "farmer",
      UserRole::Partner => "partner",
      UserRole::Buyer => "buyer",
      UserRole::Admin => "admin",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
  Pending,
  Active,
  Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: Uuid,
  pub email: String,
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub full_name: String,
  pub phone: Option<String>,
  pub location: Option<String>,
  pub role: UserRole,
  pub status: AccountStatus,
  pub email_verified: bool,
  pub partner_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str = "id, email, password_hash, full_name, phone, location, role, status, email_verified, partner_id, created_at, updated_at";

impl User {
  /// Account checks applied after the password matched.
  pub fn ensure_can_sign_in(&self) -> Result<(), AppError> {
    if !self.email_verified {
      return Err(AppError::Auth(
        "Email address has not been verified. Check your inbox for the verification link.".to_string(),
      ));
    }
    if self.status == AccountStatus::Suspended {
      return Err(AppError::Forbidden("This account has been suspended.".to_string()));
    }
    Ok(())
  }

  /// Publishing listings and receiving orders needs an approved account.
  pub fn ensure_active(&self) -> Result<(), AppError> {
    match self.status {
      AccountStatus::Active => Ok(()),
      AccountStatus::Pending => Err(AppError::Forbidden(
        "Your account is awaiting approval.".to_string(),
      )),
      AccountStatus::Suspended => Err(AppError::Forbidden("This account has been suspended.".to_string())),
    }
  }

  pub fn first_name(&self) -> &str {
    self.full_name.split_whitespace().next().unwrap_or("there")
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn sample_user(role: UserRole) -> User {
    User {
      id: Uuid::new_v4(),
      email: "ama@example.com".to_string(),
      password_hash: String::new(),
      full_name: "Ama Mensah".to_string(),
      phone: Some("+233201234567".to_string()),
      location: Some("Kumasi".to_string()),
      role,
      status: AccountStatus::Active,
      email_verified: true,
      partner_id: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn unverified_and_suspended_accounts_cannot_sign_in() {
    let mut user = sample_user(UserRole::Farmer);
    assert!(user.ensure_can_sign_in().is_ok());

    user.email_verified = false;
    assert!(matches!(user.ensure_can_sign_in(), Err(AppError::Auth(_))));

    user.email_verified = true;
    user.status = AccountStatus::Suspended;
    assert!(matches!(user.ensure_can_sign_in(), Err(AppError::Forbidden(_))));
  }

  #[test]
  fn pending_accounts_sign_in_but_are_not_active() {
    let mut user = sample_user(UserRole::Farmer);
    user.status = AccountStatus::Pending;
    assert!(user.ensure_can_sign_in().is_ok());
    assert!(user.ensure_active().is_err());
  }

  #[test]
  fn initial_status_depends_on_role() {
    assert_eq!(UserRole::Buyer.initial_status(), AccountStatus::Active);
    assert_eq!(UserRole::Farmer.initial_status(), AccountStatus::Pending);
    assert_eq!(UserRole::Partner.initial_status(), AccountStatus::Pending);
  }

  #[test]
  fn password_hash_is_never_serialized() {
    let mut user = sample_user(UserRole::Buyer);
    user.password_hash = "$argon2id$secret".to_string();
    let json = serde_json::to_string(&user).unwrap();
    assert!(!json.contains("argon2"));
    assert!(json.contains("\"emailVerified\":true"));
  }
}
