// marketplace/src/main.rs

mod config;
mod errors;
mod models;
mod pipelines;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::email::FallbackMailer;
use crate::services::email_queue::EmailQueue;
use crate::services::sms::SmsDispatcher;
use crate::services::token_store::VerificationTokenStore;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %err, "{}", context);
  io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting FarmLink server...");

  let app_config = Arc::new(AppConfig::from_env().map_err(|e| startup_error("Failed to load configuration", e))?);

  let db_pool = PgPoolOptions::new()
    .max_connections(10)
    .connect(&app_config.database_url)
    .await
    .map_err(|e| startup_error("Failed to connect to the database", e))?;
  tracing::info!("Connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .map_err(|e| startup_error("Failed to apply migrations", e))?;
    tracing::info!("Database migrations applied.");
  }

  let mailer = Arc::new(FallbackMailer::from_config(&app_config));
  tracing::info!(transports = ?mailer.transport_names(), "Email transports configured.");
  let email_queue = Arc::new(EmailQueue::new(
    mailer,
    app_config.email_queue_max_retries,
    app_config.email_queue_base_backoff,
  ));
  let sms = Arc::new(SmsDispatcher::from_config(&app_config));
  tracing::info!(providers = ?sms.provider_names(), "SMS providers configured.");
  let token_store = Arc::new(VerificationTokenStore::new());

  let queue_worker = email_queue.clone().spawn(app_config.email_queue_interval);
  let token_purger = token_store.clone().spawn_purger(app_config.token_purge_interval);

  let furrow_instance = Arc::new(furrow::Furrow::<AppError>::new());
  let app_state = AppState {
    db_pool,
    furrow: furrow_instance.clone(),
    config: app_config.clone(),
    token_store,
    email_queue,
    sms,
  };
  pipelines::register_all_pipelines(&furrow_instance, &app_state);
  tracing::info!("Pipelines registered.");

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  let result = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await;

  queue_worker.abort();
  token_purger.abort();
  if let Err(e) = &result {
    tracing::error!(error = %e, "Server exited with an error.");
  }
  tracing::info!("FarmLink server stopped.");
  result
}
