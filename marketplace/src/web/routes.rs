// marketplace/src/web/routes.rs

use actix_web::{error::InternalError, web, HttpRequest, HttpResponse};

use crate::errors::AppError;
use crate::web::handlers::{
  admin_handlers, auth_handlers, harvest_handlers, listing_handlers, order_handlers, partner_handlers,
  payment_handlers, profile_handlers, qr_code_handlers, report_handlers, transaction_handlers,
};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

fn json_error(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
  let app_err = AppError::Validation(format!("Malformed request body: {}", err));
  InternalError::from_response(err, actix_web::ResponseError::error_response(&app_err)).into()
}

fn path_error(err: actix_web::error::PathError, _req: &HttpRequest) -> actix_web::Error {
  let app_err = AppError::NotFound("Resource not found.".to_string());
  InternalError::from_response(err, actix_web::ResponseError::error_response(&app_err)).into()
}

fn query_error(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
  let app_err = AppError::Validation(format!("Invalid query string: {}", err));
  InternalError::from_response(err, actix_web::ResponseError::error_response(&app_err)).into()
}

/// Mounts every API route under `/api/v1`. Called from `main` for each worker.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().limit(64 * 1024).error_handler(json_error))
    .app_data(web::PathConfig::default().error_handler(path_error))
    .app_data(web::QueryConfig::default().error_handler(query_error))
    .service(
      web::scope("/api/v1")
        .route("/health", web::get().to(health_check_handler))
        .service(
          web::scope("/auth")
            .route("/signup", web::post().to(auth_handlers::signup_handler))
            .route("/signin", web::post().to(auth_handlers::signin_handler))
            .route("/signout", web::post().to(auth_handlers::signout_handler))
            .route("/verify-email", web::post().to(auth_handlers::verify_email_handler))
            .route("/resend-verification", web::post().to(auth_handlers::resend_verification_handler))
            .route("/forgot-password", web::post().to(auth_handlers::forgot_password_handler))
            .route("/reset-password", web::post().to(auth_handlers::reset_password_handler))
            .route("/me", web::get().to(auth_handlers::me_handler)),
        )
        .service(
          web::scope("/profile")
            .route("", web::get().to(profile_handlers::get_profile_handler))
            .route("", web::put().to(profile_handlers::update_profile_handler))
            .route("/password", web::put().to(profile_handlers::change_password_handler)),
        )
        .service(
          web::scope("/harvests")
            .route("", web::get().to(harvest_handlers::list_harvests_handler))
            .route("", web::post().to(harvest_handlers::create_harvest_handler))
            .route("/{harvest_id}", web::get().to(harvest_handlers::get_harvest_handler))
            .route("/{harvest_id}", web::put().to(harvest_handlers::update_harvest_handler))
            .route("/{harvest_id}", web::delete().to(harvest_handlers::delete_harvest_handler)),
        )
        .service(
          web::scope("/listings")
            .route("", web::get().to(listing_handlers::list_listings_handler))
            .route("", web::post().to(listing_handlers::create_listing_handler))
            // Registered before `/{listing_id}` so "mine" is not parsed as an id.
            .route("/mine", web::get().to(listing_handlers::my_listings_handler))
            .route("/{listing_id}", web::get().to(listing_handlers::get_listing_handler))
            .route("/{listing_id}", web::put().to(listing_handlers::update_listing_handler))
            .route("/{listing_id}", web::delete().to(listing_handlers::archive_listing_handler)),
        )
        .service(
          web::scope("/orders")
            .route("", web::get().to(order_handlers::list_orders_handler))
            .route("", web::post().to(order_handlers::place_order_handler))
            .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
            .route("/{order_id}/status", web::patch().to(order_handlers::update_order_status_handler)),
        )
        .service(
          web::scope("/qrcodes")
            .route("", web::get().to(qr_code_handlers::list_qr_codes_handler))
            .route("", web::post().to(qr_code_handlers::create_qr_code_handler))
            .route("/scan/{code}", web::get().to(qr_code_handlers::scan_qr_code_handler))
            .route("/{qr_id}", web::delete().to(qr_code_handlers::delete_qr_code_handler)),
        )
        .service(
          web::scope("/payment-methods")
            .route("", web::get().to(payment_handlers::list_payment_methods_handler))
            .route("", web::post().to(payment_handlers::create_payment_method_handler))
            .route("/{method_id}", web::delete().to(payment_handlers::delete_payment_method_handler))
            .route("/{method_id}/default", web::post().to(payment_handlers::set_default_payment_method_handler)),
        )
        .route("/transactions", web::get().to(transaction_handlers::list_transactions_handler))
        .route("/reports/summary", web::get().to(report_handlers::report_summary_handler))
        .service(
          web::scope("/partners")
            .route("/farmers", web::get().to(partner_handlers::list_partner_farmers_handler))
            .route("/farmers", web::post().to(partner_handlers::onboard_farmer_handler)),
        )
        .service(
          web::scope("/admin")
            .route("/approvals", web::get().to(admin_handlers::list_approvals_handler))
            .route("/users/{user_id}/approve", web::post().to(admin_handlers::approve_user_handler))
            .route("/users/{user_id}/suspend", web::post().to(admin_handlers::suspend_user_handler))
            .route("/users/{user_id}/reinstate", web::post().to(admin_handlers::reinstate_user_handler))
            .route("/listings/{listing_id}/approve", web::post().to(admin_handlers::approve_listing_handler))
            .route("/listings/{listing_id}/reject", web::post().to(admin_handlers::reject_listing_handler)),
        ),
    );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::UserRole;
  use crate::services::auth_service;
  use crate::state::tests::test_state;
  use actix_web::http::StatusCode;
  use actix_web::{test, App};
  use std::time::Duration;
  use uuid::Uuid;

  macro_rules! app {
    ($state:expr) => {
      test::init_service(App::new().app_data(web::Data::new($state)).configure(configure_app_routes)).await
    };
  }

  fn bearer(state: &crate::state::AppState, role: UserRole) -> String {
    let token = auth_service::issue_jwt(Uuid::new_v4(), role, &state.config.jwt_secret, Duration::from_secs(60)).unwrap();
    format!("Bearer {}", token)
  }

  #[actix_web::test]
  async fn health_is_public() {
    let app = app!(test_state());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
  }

  #[actix_web::test]
  async fn protected_routes_require_a_session() {
    let app = app!(test_state());
    for uri in ["/api/v1/auth/me", "/api/v1/orders", "/api/v1/reports/summary", "/api/v1/admin/approvals"] {
      let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
      assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
  }

  #[actix_web::test]
  async fn role_checks_return_forbidden() {
    let state = test_state();
    let buyer = bearer(&state, UserRole::Buyer);
    let farmer = bearer(&state, UserRole::Farmer);
    let app = app!(state);

    let resp = test::call_service(
      &app,
      test::TestRequest::get().uri("/api/v1/harvests").insert_header(("Authorization", buyer.clone())).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
      &app,
      test::TestRequest::get().uri("/api/v1/admin/approvals").insert_header(("Authorization", farmer)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
      &app,
      test::TestRequest::get().uri("/api/v1/partners/farmers").insert_header(("Authorization", buyer)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[actix_web::test]
  async fn signup_validation_is_a_bad_request() {
    let app = app!(test_state());
    let req = test::TestRequest::post()
      .uri("/api/v1/auth/signup")
      .set_json(serde_json::json!({
        "email": "not-an-email",
        "password": "short",
        "fullName": "Ama Mensah",
        "role": "farmer",
      }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("email"));
  }

  #[actix_web::test]
  async fn malformed_json_is_a_bad_request() {
    let app = app!(test_state());
    let req = test::TestRequest::post()
      .uri("/api/v1/auth/signin")
      .insert_header(("Content-Type", "application/json"))
      .set_payload("{\"email\": ")
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Malformed request body"));
  }

  #[actix_web::test]
  async fn non_uuid_path_is_not_found() {
    let state = test_state();
    let farmer = bearer(&state, UserRole::Farmer);
    let app = app!(state);
    let req = test::TestRequest::get()
      .uri("/api/v1/harvests/not-a-uuid")
      .insert_header(("Authorization", farmer))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[actix_web::test]
  async fn signout_clears_the_cookie() {
    let app = app!(test_state());
    let resp = test::call_service(&app, test::TestRequest::post().uri("/api/v1/auth/signout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
      .response()
      .cookies()
      .find(|c| c.name() == crate::web::extractors::SESSION_COOKIE)
      .unwrap();
    assert_eq!(cookie.value(), "");
  }
}
