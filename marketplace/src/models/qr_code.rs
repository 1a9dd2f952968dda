// marketplace/src/models/qr_code.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
  pub id: Uuid,
  pub code: String,
  pub farmer_id: Uuid,
  pub harvest_id: Uuid,
  pub listing_id: Option<Uuid>,
  pub scan_count: i64,
  pub last_scanned_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const QR_CODE_COLUMNS: &str =
  "id, code, farmer_id, harvest_id, listing_id, scan_count, last_scanned_at, created_at, updated_at";

/// Short printable code, e.g. `FL-3F9A0C12B7DE`.
pub fn generate_code() -> String {
  let raw = Uuid::new_v4().simple().to_string();
  format!("FL-{}", raw[..12].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn codes_are_prefixed_and_unique() {
    let a = generate_code();
    let b = generate_code();
    assert!(a.starts_with("FL-"));
    assert_eq!(a.len(), 15);
    assert!(a[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    assert_ne!(a, b);
  }
}
