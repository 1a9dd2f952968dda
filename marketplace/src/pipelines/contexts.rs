// marketplace/src/pipelines/contexts.rs

//! Pipeline inputs and the root context structs they travel in.
//! Handlers receive these wrapped in `furrow::ContextData`.

use crate::models::{Harvest, Listing, Order, OrderStatus, User, UserRole};
use crate::services::sms::is_e164;
use crate::state::AppState;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
  if is_e164(value) {
    Ok(())
  } else {
    let mut err = ValidationError::new("phone");
    err.message = Some("must be in international format, e.g. +233201234567".into());
    Err(err)
  }
}

// --- Inputs ---

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupInput {
  #[validate(email(message = "must be a valid email address"))]
  pub email: String,
  #[validate(length(min = 8, message = "must be at least 8 characters"))]
  pub password: String,
  #[validate(length(min = 1, max = 120, message = "is required"))]
  pub full_name: String,
  #[validate(custom(function = validate_phone))]
  pub phone: Option<String>,
  #[validate(length(max = 200))]
  pub location: Option<String>,
  pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SigninInput {
  #[validate(email(message = "must be a valid email address"))]
  pub email: String,
  #[validate(length(min = 1, message = "is required"))]
  pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordInput {
  #[validate(length(min = 1, message = "is required"))]
  pub token: String,
  #[validate(length(min = 8, message = "must be at least 8 characters"))]
  pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingInput {
  pub harvest_id: Uuid,
  #[validate(length(min = 1, max = 120, message = "is required"))]
  pub title: String,
  #[validate(length(max = 2000))]
  pub description: Option<String>,
  #[validate(range(min = 1, max = 1_000_000_000, message = "must be between 1 and 1000000000"))]
  pub price_cents: i64,
  #[validate(length(equal = 3, message = "must be a 3-letter currency code"))]
  pub currency: String,
  #[validate(range(exclusive_min = 0.0, max = 1_000_000.0, message = "must be positive and at most 1000000"))]
  pub quantity_kg: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderInput {
  pub listing_id: Uuid,
  #[validate(range(exclusive_min = 0.0, max = 1_000_000.0, message = "must be positive and at most 1000000"))]
  pub quantity_kg: f64,
  #[validate(length(max = 500))]
  pub notes: Option<String>,
}

// --- Root contexts ---

#[derive(Clone)]
pub struct SignupCtxData {
  pub app_state: AppState,
  pub input: SignupInput,
  pub created_user: Option<User>,
  pub verification_queued: bool,
}

#[derive(Clone)]
pub struct SigninCtxData {
  pub app_state: AppState,
  pub input: SigninInput,
  pub user: Option<User>,
  pub session_token: Option<String>,
}

#[derive(Clone)]
pub struct VerifyEmailCtxData {
  pub app_state: AppState,
  pub token: String,
  pub user: Option<User>,
  pub welcome_queued: bool,
}

#[derive(Clone)]
pub struct PasswordResetRequestCtxData {
  pub app_state: AppState,
  pub email: String,
  pub user: Option<User>,
  pub reset_link: Option<String>,
  pub reset_queued: bool,
}

#[derive(Clone)]
pub struct PasswordResetConfirmCtxData {
  pub app_state: AppState,
  pub input: ResetPasswordInput,
  pub user_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CreateListingCtxData {
  pub app_state: AppState,
  pub farmer_id: Uuid,
  pub input: CreateListingInput,
  pub farmer: Option<User>,
  pub harvest: Option<Harvest>,
  pub listing: Option<Listing>,
}

#[derive(Clone)]
pub struct PlaceOrderCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub input: PlaceOrderInput,
  pub listing: Option<Listing>,
  pub farmer: Option<User>,
  pub order: Option<Order>,
  pub farmer_emailed: bool,
  pub sms_provider: Option<String>,
}

#[derive(Clone)]
pub struct UpdateOrderStatusCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub actor_id: Uuid,
  pub actor_role: UserRole,
  pub next_status: OrderStatus,
  pub order: Option<Order>,
  pub updated: Option<Order>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn signup(email: &str, password: &str, phone: Option<&str>) -> SignupInput {
    SignupInput {
      email: email.to_string(),
      password: password.to_string(),
      full_name: "Kofi Boateng".to_string(),
      phone: phone.map(str::to_string),
      location: None,
      role: UserRole::Farmer,
    }
  }

  #[test]
  fn signup_input_validation() {
    assert!(signup("kofi@example.com", "longenough", Some("+233201234567")).validate().is_ok());
    assert!(signup("kofi@example.com", "longenough", None).validate().is_ok());

    let errs = signup("not-an-email", "short", Some("0201234567")).validate().unwrap_err();
    let fields = errs.field_errors();
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("password"));
    assert!(fields.contains_key("phone"));
  }

  #[test]
  fn listing_and_order_inputs_reject_non_positive_amounts() {
    let listing = CreateListingInput {
      harvest_id: Uuid::new_v4(),
      title: "Yam".to_string(),
      description: None,
      price_cents: 0,
      currency: "GHS".to_string(),
      quantity_kg: 0.0,
    };
    let errs = listing.validate().unwrap_err();
    assert!(errs.field_errors().contains_key("price_cents"));
    assert!(errs.field_errors().contains_key("quantity_kg"));

    let order = PlaceOrderInput {
      listing_id: Uuid::new_v4(),
      quantity_kg: -1.0,
      notes: None,
    };
    assert!(order.validate().is_err());
  }

  #[test]
  fn listing_and_order_inputs_cap_amounts() {
    let listing = CreateListingInput {
      harvest_id: Uuid::new_v4(),
      title: "Cocoa".to_string(),
      description: None,
      price_cents: 9_000_000_000_000_000_000,
      currency: "GHS".to_string(),
      quantity_kg: 2_000_000.0,
    };
    let errs = listing.validate().unwrap_err();
    assert!(errs.field_errors().contains_key("price_cents"));
    assert!(errs.field_errors().contains_key("quantity_kg"));

    let order = PlaceOrderInput {
      listing_id: Uuid::new_v4(),
      quantity_kg: 1_000_001.0,
      notes: None,
    };
    assert!(order.validate().is_err());
  }

  #[test]
  fn signup_role_deserializes_lowercase() {
    let input: SignupInput = serde_json::from_value(serde_json::json!({
      "email": "a@example.com",
      "password": "password1",
      "fullName": "Abena",
      "role": "partner"
    }))
    .unwrap();
    assert_eq!(input.role, UserRole::Partner);
    assert!(input.phone.is_none());
  }
}
