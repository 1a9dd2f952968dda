// marketplace/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::email::EmailMessage;
use crate::services::email_queue::EmailQueue;
use crate::services::sms::SmsDispatcher;
use crate::services::token_store::VerificationTokenStore;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: PgPool,
  pub furrow: Arc<furrow::Furrow<AppError>>,
  pub config: Arc<AppConfig>,
  pub token_store: Arc<VerificationTokenStore>,
  pub email_queue: Arc<EmailQueue>,
  pub sms: Arc<SmsDispatcher>,
}

impl AppState {
  pub fn queue_email(&self, message: EmailMessage) {
    self.email_queue.enqueue(message);
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::config::tests::test_config;
  use crate::services::email::FallbackMailer;
  use sqlx::postgres::PgPoolOptions;

  /// State with a lazily connecting pool. Handlers that never touch the
  /// database can be exercised without a running Postgres.
  pub(crate) fn test_state() -> AppState {
    let config = Arc::new(test_config());
    let db_pool = PgPoolOptions::new()
      .acquire_timeout(std::time::Duration::from_millis(200))
      .connect_lazy(&config.database_url)
      .expect("lazy pool");
    let mailer = Arc::new(FallbackMailer::from_config(&config));
    let state = AppState {
      db_pool,
      furrow: Arc::new(furrow::Furrow::new()),
      email_queue: Arc::new(EmailQueue::new(mailer, config.email_queue_max_retries, config.email_queue_base_backoff)),
      sms: Arc::new(SmsDispatcher::from_config(&config)),
      token_store: Arc::new(VerificationTokenStore::new()),
      config,
    };
    crate::pipelines::register_all_pipelines(&state.furrow, &state);
    state
  }
}
