// marketplace/src/models/transaction.rs

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
  Sale,
  Purchase,
  Commission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
  Pending,
  Completed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
  pub id: Uuid,
  pub user_id: Uuid,
  pub order_id: Option<Uuid>,
  pub kind: TransactionKind,
  pub amount_cents: i64,
  pub currency: String,
  pub status: TransactionStatus,
  pub reference: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const TRANSACTION_COLUMNS: &str =
  "id, user_id, order_id, kind, amount_cents, currency, status, reference, created_at, updated_at";

/// Partner share of an order total, `bps` in basis points. Rounds down.
pub fn commission_cents(total_cents: i64, bps: i64) -> Result<i64, AppError> {
  let share = i128::from(total_cents) * i128::from(bps) / 10_000;
  i64::try_from(share).map_err(|_| AppError::Validation("Commission exceeds the supported amount range.".to_string()))
}

/// One ledger row to write for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
  pub user_id: Uuid,
  pub kind: TransactionKind,
  pub amount_cents: i64,
}

/// Rows recorded when an order is delivered: the farmer's sale, the buyer's
/// purchase and, when the farmer has a partner, a non-zero commission.
pub fn delivery_entries(
  total_cents: i64,
  farmer_id: Uuid,
  buyer_id: Uuid,
  partner_id: Option<Uuid>,
  commission_bps: i64,
) -> Result<Vec<LedgerEntry>, AppError> {
  let mut entries = vec![
    LedgerEntry { user_id: farmer_id, kind: TransactionKind::Sale, amount_cents: total_cents },
    LedgerEntry { user_id: buyer_id, kind: TransactionKind::Purchase, amount_cents: total_cents },
  ];
  if let Some(partner_id) = partner_id {
    let commission = commission_cents(total_cents, commission_bps)?;
    if commission > 0 {
      entries.push(LedgerEntry { user_id: partner_id, kind: TransactionKind::Commission, amount_cents: commission });
    }
  }
  Ok(entries)
}

/// Human-readable reference shared by the transactions of one order.
pub fn reference_for(kind: TransactionKind, order_id: Uuid) -> String {
  let prefix = match kind {
    TransactionKind::Sale => "SAL",
    TransactionKind::Purchase => "PUR",
    TransactionKind::Commission => "COM",
  };
  let short = order_id.simple().to_string();
  format!("{}-{}", prefix, short[..10].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn commission_is_basis_points_of_total() {
    assert_eq!(commission_cents(10_000, 500).unwrap(), 500);
    assert_eq!(commission_cents(12_345, 250).unwrap(), 308);
    assert_eq!(commission_cents(999, 0).unwrap(), 0);
  }

  #[test]
  fn commission_on_huge_totals_does_not_overflow() {
    assert_eq!(commission_cents(9_000_000_000_000_000_000, 500).unwrap(), 450_000_000_000_000_000);
    assert!(matches!(commission_cents(i64::MAX, 20_000), Err(AppError::Validation(_))));
  }

  #[test]
  fn delivery_without_partner_records_sale_and_purchase() {
    let (farmer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
    let entries = delivery_entries(4_000, farmer, buyer, None, 500).unwrap();
    assert_eq!(
      entries,
      vec![
        LedgerEntry { user_id: farmer, kind: TransactionKind::Sale, amount_cents: 4_000 },
        LedgerEntry { user_id: buyer, kind: TransactionKind::Purchase, amount_cents: 4_000 },
      ]
    );
  }

  #[test]
  fn delivery_with_partner_adds_commission() {
    let (farmer, buyer, partner) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let entries = delivery_entries(4_000, farmer, buyer, Some(partner), 500).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2], LedgerEntry { user_id: partner, kind: TransactionKind::Commission, amount_cents: 200 });
  }

  #[test]
  fn zero_commission_is_not_recorded() {
    let entries = delivery_entries(10, Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()), 500).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.kind != TransactionKind::Commission));
  }

  #[test]
  fn references_carry_kind_prefix() {
    let id = Uuid::new_v4();
    assert!(reference_for(TransactionKind::Sale, id).starts_with("SAL-"));
    assert!(reference_for(TransactionKind::Commission, id).starts_with("COM-"));
    assert_eq!(
      reference_for(TransactionKind::Sale, id)[4..],
      reference_for(TransactionKind::Purchase, id)[4..]
    );
  }
}
