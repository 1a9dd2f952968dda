// marketplace/src/models/harvest.rs

use crate::errors::AppError;
use crate::models::listing::STOCK_TOLERANCE_KG;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "harvest_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HarvestStatus {
  Logged,
  Listed,
  Sold,
  Archived,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Harvest {
  pub id: Uuid,
  pub farmer_id: Uuid,
  pub crop: String,
  pub variety: Option<String>,
  pub quantity_kg: f64,
  pub unit_price_cents: Option<i64>,
  pub harvested_on: NaiveDate,
  pub location: Option<String>,
  pub notes: Option<String>,
  pub status: HarvestStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const HARVEST_COLUMNS: &str =
  "id, farmer_id, crop, variety, quantity_kg, unit_price_cents, harvested_on, location, notes, status, created_at, updated_at";

impl Harvest {
  /// Logged and already-listed harvests can back new listings.
  pub fn is_listable(&self) -> bool {
    matches!(self.status, HarvestStatus::Logged | HarvestStatus::Listed)
  }
}

/// How much of a harvest is already committed: stock still on listings that
/// hold it plus every order that was not cancelled.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct HarvestAllocation {
  pub allocated_kg: f64,
  pub live_listings: i64,
}

/// Selects a `HarvestAllocation` for harvest `$1`.
pub const HARVEST_ALLOCATION_QUERY: &str = "SELECT \
   (COALESCE((SELECT SUM(quantity_kg) FROM listings \
     WHERE harvest_id = $1 AND status IN ('pending_approval', 'active', 'sold_out')), 0) \
   + COALESCE((SELECT SUM(o.quantity_kg) FROM orders o JOIN listings l ON l.id = o.listing_id \
     WHERE l.harvest_id = $1 AND o.status <> 'cancelled'), 0))::DOUBLE PRECISION AS allocated_kg, \
   (SELECT COUNT(*) FROM listings WHERE harvest_id = $1 AND status IN ('pending_approval', 'active')) AS live_listings";

impl HarvestAllocation {
  pub fn available_kg(&self, harvest: &Harvest) -> f64 {
    (harvest.quantity_kg - self.allocated_kg).max(0.0)
  }

  pub fn check_new_listing(&self, harvest: &Harvest, requested_kg: f64) -> Result<(), AppError> {
    let available = self.available_kg(harvest);
    if requested_kg > available + STOCK_TOLERANCE_KG {
      return Err(AppError::Validation(format!(
        "quantity_kg: only {} kg of this harvest is still unlisted",
        available
      )));
    }
    Ok(())
  }

  pub fn check_quantity_change(&self, new_quantity_kg: f64) -> Result<(), AppError> {
    if new_quantity_kg + STOCK_TOLERANCE_KG < self.allocated_kg {
      return Err(AppError::Conflict(format!(
        "quantity_kg: {} kg is already listed or sold",
        self.allocated_kg
      )));
    }
    Ok(())
  }

  /// Status the harvest should carry given its listings. Archived harvests stay archived.
  pub fn settled_status(&self, harvest: &Harvest) -> HarvestStatus {
    if harvest.status == HarvestStatus::Archived {
      HarvestStatus::Archived
    } else if self.live_listings > 0 {
      HarvestStatus::Listed
    } else if self.allocated_kg > STOCK_TOLERANCE_KG && self.allocated_kg + STOCK_TOLERANCE_KG >= harvest.quantity_kg {
      HarvestStatus::Sold
    } else if self.allocated_kg > STOCK_TOLERANCE_KG {
      HarvestStatus::Listed
    } else {
      HarvestStatus::Logged
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn harvest(quantity_kg: f64, status: HarvestStatus) -> Harvest {
    Harvest {
      id: Uuid::new_v4(),
      farmer_id: Uuid::new_v4(),
      crop: "Cassava".to_string(),
      variety: None,
      quantity_kg,
      unit_price_cents: None,
      harvested_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
      location: None,
      notes: None,
      status,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn allocation(allocated_kg: f64, live_listings: i64) -> HarvestAllocation {
    HarvestAllocation { allocated_kg, live_listings }
  }

  #[test]
  fn second_listing_cannot_exceed_what_is_left() {
    let h = harvest(100.0, HarvestStatus::Listed);
    let after_first = allocation(100.0, 1);
    assert!(matches!(after_first.check_new_listing(&h, 100.0), Err(AppError::Validation(_))));

    let partial = allocation(60.0, 1);
    assert!(partial.check_new_listing(&h, 40.0).is_ok());
    assert!(partial.check_new_listing(&h, 40.5).is_err());
  }

  #[test]
  fn quantity_cannot_drop_below_allocation() {
    let committed = allocation(70.0, 1);
    assert!(matches!(committed.check_quantity_change(50.0), Err(AppError::Conflict(_))));
    assert!(committed.check_quantity_change(70.0).is_ok());
    assert!(committed.check_quantity_change(120.0).is_ok());
  }

  #[test]
  fn fully_sold_harvest_settles_as_sold() {
    let h = harvest(100.0, HarvestStatus::Listed);
    assert_eq!(allocation(100.0, 0).settled_status(&h), HarvestStatus::Sold);
    assert_eq!(allocation(100.0, 1).settled_status(&h), HarvestStatus::Listed);
    assert_eq!(allocation(40.0, 0).settled_status(&h), HarvestStatus::Listed);
  }

  #[test]
  fn released_harvest_returns_to_logged() {
    let h = harvest(100.0, HarvestStatus::Listed);
    assert_eq!(allocation(0.0, 0).settled_status(&h), HarvestStatus::Logged);
    let archived = harvest(100.0, HarvestStatus::Archived);
    assert_eq!(allocation(0.0, 0).settled_status(&archived), HarvestStatus::Archived);
  }
}
