// marketplace/src/models/order.rs

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Shipped,
  Delivered,
  Cancelled,
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderParty {
  Buyer,
  Farmer,
  Admin,
}

impl OrderStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  /// Checks `self -> next` against the order lifecycle and who may perform it.
  ///
  /// Pending -> Confirmed -> Shipped -> Delivered; Pending|Confirmed -> Cancelled.
  /// The farmer confirms and ships, the buyer confirms delivery, either cancels.
  /// Admins may perform any legal transition.
  pub fn check_transition(&self, next: OrderStatus, party: OrderParty) -> Result<(), AppError> {
    use OrderStatus::*;
    let legal = matches!(
      (self, next),
      (Pending, Confirmed) | (Confirmed, Shipped) | (Shipped, Delivered) | (Pending, Cancelled) | (Confirmed, Cancelled)
    );
    if !legal {
      return Err(AppError::Validation(format!(
        "Order cannot move from {:?} to {:?}.",
        self, next
      )));
    }
    let allowed = match (party, next) {
      (OrderParty::Admin, _) => true,
      (OrderParty::Farmer, Confirmed | Shipped | Cancelled) => true,
      (OrderParty::Buyer, Delivered | Cancelled) => true,
      _ => false,
    };
    if !allowed {
      return Err(AppError::Forbidden(format!(
        "You are not allowed to mark this order as {:?}.",
        next
      )));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub listing_id: Uuid,
  pub buyer_id: Uuid,
  pub farmer_id: Uuid,
  pub quantity_kg: f64,
  pub total_cents: i64,
  pub currency: String,
  pub status: OrderStatus,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const ORDER_COLUMNS: &str =
  "id, listing_id, buyer_id, farmer_id, quantity_kg, total_cents, currency, status, notes, created_at, updated_at";

impl Order {
  pub fn party_of(&self, user_id: Uuid, is_admin: bool) -> Option<OrderParty> {
    if user_id == self.buyer_id {
      Some(OrderParty::Buyer)
    } else if user_id == self.farmer_id {
      Some(OrderParty::Farmer)
    } else if is_admin {
      Some(OrderParty::Admin)
    } else {
      None
    }
  }
}

/// Largest order total accepted, in cents.
pub const MAX_ORDER_TOTAL_CENTS: i64 = 1_000_000_000_000_000;

/// Order total for `quantity_kg` at `price_cents` per kilogram, rounded to the nearest cent.
pub fn total_cents(price_cents: i64, quantity_kg: f64) -> Result<i64, AppError> {
  let total = (price_cents as f64 * quantity_kg).round();
  if !total.is_finite() || total < 0.0 || total > MAX_ORDER_TOTAL_CENTS as f64 {
    return Err(AppError::Validation("Order total exceeds the supported amount range.".to_string()));
  }
  Ok(total as i64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use OrderStatus::*;

  #[test]
  fn happy_path_follows_roles() {
    assert!(Pending.check_transition(Confirmed, OrderParty::Farmer).is_ok());
    assert!(Confirmed.check_transition(Shipped, OrderParty::Farmer).is_ok());
    assert!(Shipped.check_transition(Delivered, OrderParty::Buyer).is_ok());
  }

  #[test]
  fn illegal_transitions_are_validation_errors() {
    for (from, to) in [(Pending, Shipped), (Pending, Delivered), (Shipped, Cancelled), (Delivered, Cancelled), (Cancelled, Pending)] {
      assert!(
        matches!(from.check_transition(to, OrderParty::Admin), Err(AppError::Validation(_))),
        "{:?} -> {:?} should be rejected",
        from,
        to
      );
    }
  }

  #[test]
  fn wrong_party_is_forbidden() {
    assert!(matches!(Pending.check_transition(Confirmed, OrderParty::Buyer), Err(AppError::Forbidden(_))));
    assert!(matches!(Shipped.check_transition(Delivered, OrderParty::Farmer), Err(AppError::Forbidden(_))));
    assert!(Pending.check_transition(Cancelled, OrderParty::Buyer).is_ok());
    assert!(Confirmed.check_transition(Cancelled, OrderParty::Farmer).is_ok());
  }

  #[test]
  fn totals_round_to_cents() {
    assert_eq!(total_cents(250, 4.0).unwrap(), 1000);
    assert_eq!(total_cents(333, 1.5).unwrap(), 500);
    assert_eq!(total_cents(100, 0.125).unwrap(), 13);
  }

  #[test]
  fn out_of_range_totals_are_rejected() {
    assert!(matches!(total_cents(9_000_000_000_000_000_000, 1.0), Err(AppError::Validation(_))));
    assert!(matches!(total_cents(100, f64::INFINITY), Err(AppError::Validation(_))));
    assert!(total_cents(1_000_000_000, 1_000_000.0).is_ok());
  }

  #[test]
  fn terminal_states() {
    assert!(Delivered.is_terminal());
    assert!(Cancelled.is_terminal());
    assert!(!Shipped.is_terminal());
  }
}
