// marketplace/src/web/handlers/transaction_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;

use crate::errors::AppError;
use crate::models::transaction::TRANSACTION_COLUMNS;
use crate::models::Transaction;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::list_transactions", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_transactions_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let query = format!(
    "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, reference",
    TRANSACTION_COLUMNS
  );
  let transactions = sqlx::query_as::<_, Transaction>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(transactions))
}
