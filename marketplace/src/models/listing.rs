// marketplace/src/models/listing.rs

use crate::errors::AppError;
use crate::models::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "listing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
  PendingApproval,
  Active,
  SoldOut,
  Archived,
  Rejected,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
  pub id: Uuid,
  pub harvest_id: Uuid,
  pub farmer_id: Uuid,
  pub title: String,
  pub description: Option<String>,
  /// Price per kilogram.
  pub price_cents: i64,
  pub currency: String,
  pub quantity_kg: f64,
  pub status: ListingStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const LISTING_COLUMNS: &str =
  "id, harvest_id, farmer_id, title, description, price_cents, currency, quantity_kg, status, created_at, updated_at";

impl Listing {
  pub fn is_orderable(&self) -> bool {
    self.status == ListingStatus::Active && self.quantity_kg > 0.0
  }

  /// Archived and rejected listings are frozen.
  pub fn is_editable(&self) -> bool {
    !matches!(self.status, ListingStatus::Archived | ListingStatus::Rejected)
  }

  /// Checks a buyer may order from this listing right now. Both accounts must be active.
  pub fn check_order_request(&self, buyer: &User, farmer: &User) -> Result<(), AppError> {
    if self.farmer_id == buyer.id {
      return Err(AppError::Validation("You cannot order your own listing.".to_string()));
    }
    buyer.ensure_active()?;
    if farmer.ensure_active().is_err() || !self.is_orderable() {
      return Err(AppError::Conflict("This listing is not available for ordering.".to_string()));
    }
    Ok(())
  }

  /// Stock left after selling `requested_kg`, or `None` when the listing cannot cover it.
  pub fn reserve(&self, requested_kg: f64) -> Option<StockChange> {
    if self.status != ListingStatus::Active || requested_kg <= 0.0 || requested_kg > self.quantity_kg + STOCK_TOLERANCE_KG {
      return None;
    }
    let remaining_kg = self.quantity_kg - requested_kg;
    if remaining_kg <= STOCK_TOLERANCE_KG {
      Some(StockChange { remaining_kg: 0.0, status: ListingStatus::SoldOut })
    } else {
      Some(StockChange { remaining_kg, status: ListingStatus::Active })
    }
  }

  /// Stock after a cancelled order gives `returned_kg` back. A sold-out listing reopens.
  pub fn restock(&self, returned_kg: f64) -> StockChange {
    let status = match self.status {
      ListingStatus::SoldOut => ListingStatus::Active,
      other => other,
    };
    StockChange { remaining_kg: self.quantity_kg + returned_kg, status }
  }
}

/// Remaining stock at or below this is treated as zero.
pub const STOCK_TOLERANCE_KG: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockChange {
  pub remaining_kg: f64,
  pub status: ListingStatus,
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::models::user::tests::sample_user;
  use crate::models::{AccountStatus, UserRole};

  pub(crate) fn sample_listing(farmer_id: Uuid, quantity_kg: f64, status: ListingStatus) -> Listing {
    Listing {
      id: Uuid::new_v4(),
      harvest_id: Uuid::new_v4(),
      farmer_id,
      title: "White maize".to_string(),
      description: None,
      price_cents: 450,
      currency: "GHS".to_string(),
      quantity_kg,
      status,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn reserve_refuses_oversell() {
    let listing = sample_listing(Uuid::new_v4(), 10.0, ListingStatus::Active);
    assert!(listing.reserve(10.5).is_none());
    assert!(listing.reserve(0.0).is_none());
    assert_eq!(
      listing.reserve(4.0),
      Some(StockChange { remaining_kg: 6.0, status: ListingStatus::Active })
    );
  }

  #[test]
  fn reserving_the_last_kilograms_sells_out() {
    let listing = sample_listing(Uuid::new_v4(), 10.0, ListingStatus::Active);
    assert_eq!(
      listing.reserve(10.0),
      Some(StockChange { remaining_kg: 0.0, status: ListingStatus::SoldOut })
    );
    let nearly = sample_listing(Uuid::new_v4(), 0.3, ListingStatus::Active);
    assert_eq!(nearly.reserve(0.1 + 0.2).map(|c| c.status), Some(ListingStatus::SoldOut));
  }

  #[test]
  fn only_active_listings_reserve() {
    for status in [ListingStatus::PendingApproval, ListingStatus::SoldOut, ListingStatus::Archived, ListingStatus::Rejected] {
      assert!(sample_listing(Uuid::new_v4(), 10.0, status).reserve(1.0).is_none());
    }
  }

  #[test]
  fn restock_reopens_sold_out_listing() {
    let sold_out = sample_listing(Uuid::new_v4(), 0.0, ListingStatus::SoldOut);
    assert_eq!(sold_out.restock(2.5), StockChange { remaining_kg: 2.5, status: ListingStatus::Active });

    let archived = sample_listing(Uuid::new_v4(), 1.0, ListingStatus::Archived);
    assert_eq!(archived.restock(1.0).status, ListingStatus::Archived);
  }

  #[test]
  fn order_request_needs_active_accounts() {
    let farmer = sample_user(UserRole::Farmer);
    let buyer = sample_user(UserRole::Buyer);
    let listing = sample_listing(farmer.id, 10.0, ListingStatus::Active);
    assert!(listing.check_order_request(&buyer, &farmer).is_ok());

    let mut suspended_buyer = buyer.clone();
    suspended_buyer.status = AccountStatus::Suspended;
    assert!(matches!(listing.check_order_request(&suspended_buyer, &farmer), Err(AppError::Forbidden(_))));

    let mut suspended_farmer = farmer.clone();
    suspended_farmer.status = AccountStatus::Suspended;
    assert!(matches!(listing.check_order_request(&buyer, &suspended_farmer), Err(AppError::Conflict(_))));
  }

  #[test]
  fn farmers_cannot_order_their_own_listing() {
    let farmer = sample_user(UserRole::Farmer);
    let listing = sample_listing(farmer.id, 10.0, ListingStatus::Active);
    assert!(matches!(listing.check_order_request(&farmer, &farmer), Err(AppError::Validation(_))));
  }
}
