// marketplace/src/models/payment_method.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_method_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
  MobileMoney,
  BankAccount,
  Card,
}

/// Stored payout/payment metadata. No card or account numbers beyond the last four digits.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
  pub id: Uuid,
  pub user_id: Uuid,
  pub kind: PaymentMethodKind,
  pub label: String,
  pub account_last4: String,
  pub provider: Option<String>,
  pub is_default: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const PAYMENT_METHOD_COLUMNS: &str =
  "id, user_id, kind, label, account_last4, provider, is_default, created_at, updated_at";

/// Last four digits of an account or card number; `None` when fewer than four digits are present.
pub fn last4(account_number: &str) -> Option<String> {
  let digits: Vec<char> = account_number.chars().filter(|c| c.is_ascii_digit()).collect();
  if digits.len() < 4 {
    return None;
  }
  Some(digits[digits.len() - 4..].iter().collect())
}

/// The method that takes over as default when the current default is removed: the oldest one left.
pub fn next_default(remaining: &[PaymentMethod]) -> Option<Uuid> {
  remaining
    .iter()
    .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    .map(|m| m.id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn method(user_id: Uuid, age_days: i64) -> PaymentMethod {
    let created_at = Utc::now() - Duration::days(age_days);
    PaymentMethod {
      id: Uuid::new_v4(),
      user_id,
      kind: PaymentMethodKind::MobileMoney,
      label: format!("wallet {}", age_days),
      account_last4: "0199".to_string(),
      provider: None,
      is_default: false,
      created_at,
      updated_at: created_at,
    }
  }

  #[test]
  fn oldest_remaining_method_becomes_default() {
    let user_id = Uuid::new_v4();
    let newer = method(user_id, 1);
    let oldest = method(user_id, 30);
    let middle = method(user_id, 7);
    let oldest_id = oldest.id;
    assert_eq!(next_default(&[newer, oldest, middle]), Some(oldest_id));
  }

  #[test]
  fn no_default_when_nothing_remains() {
    assert_eq!(next_default(&[]), None);
  }

  #[test]
  fn last4_ignores_separators() {
    assert_eq!(last4("4111 1111 1111 1234").as_deref(), Some("1234"));
    assert_eq!(last4("+233-20-555-0199").as_deref(), Some("0199"));
    assert_eq!(last4("12a3"), None);
  }
}
