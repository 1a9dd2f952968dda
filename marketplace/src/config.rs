// marketplace/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SendGridConfig {
  pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
  pub host: String,
  pub port: u16,
  pub username: Option<String>,
  pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
  pub account_sid: String,
  pub auth_token: String,
  pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct AfricasTalkingConfig {
  pub username: String,
  pub api_key: String,
  pub sender_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TermiiConfig {
  pub api_key: String,
  pub sender_id: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,
  pub frontend_url: String,
  pub run_migrations: bool,

  pub jwt_secret: String,
  pub jwt_ttl: Duration,
  pub verification_token_ttl: Duration,
  pub reset_token_ttl: Duration,
  pub token_purge_interval: Duration,

  pub email_sender: String,
  pub email_queue_interval: Duration,
  pub email_queue_max_retries: u32,
  pub email_queue_base_backoff: Duration,

  /// Partner commission in basis points of an order total.
  pub partner_commission_bps: i64,

  pub sendgrid: Option<SendGridConfig>,
  pub smtp: Option<SmtpConfig>,
  pub twilio: Option<TwilioConfig>,
  pub africas_talking: Option<AfricasTalkingConfig>,
  pub termii: Option<TermiiConfig>,
  pub sms_provider_order: Vec<String>,
}

/// Source of raw configuration values. The process environment in production,
/// a map in tests.
pub trait ConfigSource {
  fn get(&self, key: &str) -> Option<String>;
}

struct ProcessEnv;

impl ConfigSource for ProcessEnv {
  fn get(&self, key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
  }
}

impl<S: std::hash::BuildHasher> ConfigSource for std::collections::HashMap<String, String, S> {
  fn get(&self, key: &str) -> Option<String> {
    std::collections::HashMap::get(self, key).cloned().filter(|v| !v.trim().is_empty())
  }
}

fn required(src: &dyn ConfigSource, key: &str) -> Result<String> {
  src
    .get(key)
    .ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", key)))
}

fn parsed<T>(src: &dyn ConfigSource, key: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match src.get(key) {
    None => Ok(default),
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_source(&ProcessEnv)
  }

  pub fn from_source(src: &dyn ConfigSource) -> Result<Self> {
    let server_host = src.get("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parsed::<u16>(src, "SERVER_PORT", 8080)?;
    let database_url = required(src, "DATABASE_URL")?;
    let app_base_url = src
      .get("APP_BASE_URL")
      .unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));
    let frontend_url = src.get("FRONTEND_URL").unwrap_or_else(|| app_base_url.clone());
    let run_migrations = parsed::<bool>(src, "RUN_MIGRATIONS", true)?;

    let jwt_secret = required(src, "JWT_SECRET")?;
    if jwt_secret.len() < 16 {
      return Err(AppError::Config("JWT_SECRET must be at least 16 characters".to_string()));
    }
    let jwt_ttl = Duration::from_secs(parsed::<u64>(src, "JWT_TTL_HOURS", 24)? * 3600);
    let verification_token_ttl = Duration::from_secs(parsed::<u64>(src, "VERIFICATION_TOKEN_TTL_MINUTES", 1440)? * 60);
    let reset_token_ttl = Duration::from_secs(parsed::<u64>(src, "RESET_TOKEN_TTL_MINUTES", 60)? * 60);
    let token_purge_interval = Duration::from_secs(parsed::<u64>(src, "TOKEN_PURGE_INTERVAL_SECS", 300)?.max(1));

    let email_sender = src
      .get("EMAIL_SENDER")
      .unwrap_or_else(|| "noreply@farmlink.local".to_string());
    let email_queue_interval = Duration::from_millis(parsed::<u64>(src, "EMAIL_QUEUE_INTERVAL_MS", 1000)?.max(10));
    let email_queue_max_retries = parsed::<u32>(src, "EMAIL_QUEUE_MAX_RETRIES", 3)?;
    let email_queue_base_backoff = Duration::from_millis(parsed::<u64>(src, "EMAIL_QUEUE_BASE_BACKOFF_MS", 2000)?);

    let partner_commission_bps = parsed::<i64>(src, "PARTNER_COMMISSION_BPS", 500)?;
    if !(0..=10_000).contains(&partner_commission_bps) {
      return Err(AppError::Config(
        "PARTNER_COMMISSION_BPS must be between 0 and 10000".to_string(),
      ));
    }

    let sendgrid = src.get("SENDGRID_API_KEY").map(|api_key| SendGridConfig { api_key });
    let smtp = match src.get("SMTP_HOST") {
      Some(host) => Some(SmtpConfig {
        host,
        port: parsed::<u16>(src, "SMTP_PORT", 587)?,
        username: src.get("SMTP_USERNAME"),
        password: src.get("SMTP_PASSWORD"),
      }),
      None => None,
    };

    let twilio = match (
      src.get("TWILIO_ACCOUNT_SID"),
      src.get("TWILIO_AUTH_TOKEN"),
      src.get("TWILIO_FROM_NUMBER"),
    ) {
      (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
        account_sid,
        auth_token,
        from_number,
      }),
      _ => None,
    };
    let africas_talking = match (src.get("AT_USERNAME"), src.get("AT_API_KEY")) {
      (Some(username), Some(api_key)) => Some(AfricasTalkingConfig {
        username,
        api_key,
        sender_id: src.get("AT_SENDER_ID"),
      }),
      _ => None,
    };
    let termii = src.get("TERMII_API_KEY").map(|api_key| TermiiConfig {
      api_key,
      sender_id: src.get("TERMII_SENDER_ID").unwrap_or_else(|| "FarmLink".to_string()),
    });
    let sms_provider_order = src
      .get("SMS_PROVIDER_ORDER")
      .unwrap_or_else(|| "twilio,africastalking,termii".to_string())
      .split(',')
      .map(|s| s.trim().to_lowercase())
      .filter(|s| !s.is_empty())
      .collect();

    tracing::info!(
      sendgrid = sendgrid.is_some(),
      smtp = smtp.is_some(),
      twilio = twilio.is_some(),
      africas_talking = africas_talking.is_some(),
      termii = termii.is_some(),
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      frontend_url,
      run_migrations,
      jwt_secret,
      jwt_ttl,
      verification_token_ttl,
      reset_token_ttl,
      token_purge_interval,
      email_sender,
      email_queue_interval,
      email_queue_max_retries,
      email_queue_base_backoff,
      partner_commission_bps,
      sendgrid,
      smtp,
      twilio,
      africas_talking,
      termii,
      sms_provider_order,
    })
  }

  /// Link the frontend opens to complete an action carrying `token`.
  pub fn frontend_link(&self, path: &str, token: &str) -> String {
    format!("{}/{}?token={}", self.frontend_url.trim_end_matches('/'), path.trim_start_matches('/'), token)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::collections::HashMap;

  pub(crate) fn base_env() -> HashMap<String, String> {
    HashMap::from([
      ("DATABASE_URL".to_string(), "postgres://localhost/farmlink".to_string()),
      ("JWT_SECRET".to_string(), "0123456789abcdef0123".to_string()),
    ])
  }

  /// Config with defaults only, for tests elsewhere in the crate.
  pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_source(&base_env()).expect("base config")
  }

  #[test]
  fn applies_defaults() {
    let cfg = test_config();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.app_base_url, "http://127.0.0.1:8080");
    assert_eq!(cfg.frontend_url, cfg.app_base_url);
    assert_eq!(cfg.jwt_ttl, Duration::from_secs(24 * 3600));
    assert_eq!(cfg.email_queue_max_retries, 3);
    assert_eq!(cfg.sms_provider_order, vec!["twilio", "africastalking", "termii"]);
    assert!(cfg.sendgrid.is_none());
    assert!(cfg.smtp.is_none());
  }

  #[test]
  fn missing_database_url_is_a_config_error() {
    let mut env = base_env();
    env.remove("DATABASE_URL");
    assert!(matches!(AppConfig::from_source(&env), Err(AppError::Config(m)) if m.contains("DATABASE_URL")));
  }

  #[test]
  fn rejects_unparsable_port_and_short_secret() {
    let mut env = base_env();
    env.insert("SERVER_PORT".into(), "eighty".into());
    assert!(matches!(AppConfig::from_source(&env), Err(AppError::Config(m)) if m.contains("SERVER_PORT")));

    let mut env = base_env();
    env.insert("JWT_SECRET".into(), "short".into());
    assert!(AppConfig::from_source(&env).is_err());
  }

  #[test]
  fn providers_enable_only_with_full_credentials() {
    let mut env = base_env();
    env.insert("TWILIO_ACCOUNT_SID".into(), "AC1".into());
    env.insert("TWILIO_AUTH_TOKEN".into(), "tok".into());
    env.insert("SMTP_HOST".into(), "smtp.example.com".into());
    env.insert("SMS_PROVIDER_ORDER".into(), " Termii , twilio ".into());
    let cfg = AppConfig::from_source(&env).unwrap();
    assert!(cfg.twilio.is_none());
    assert_eq!(cfg.smtp.as_ref().map(|s| s.port), Some(587));
    assert_eq!(cfg.sms_provider_order, vec!["termii", "twilio"]);
  }

  #[test]
  fn frontend_link_joins_cleanly() {
    let mut env = base_env();
    env.insert("FRONTEND_URL".into(), "https://farmlink.app/".into());
    let cfg = AppConfig::from_source(&env).unwrap();
    assert_eq!(cfg.frontend_link("/verify-email", "abc"), "https://farmlink.app/verify-email?token=abc");
  }

  #[test]
  #[serial_test::serial]
  fn from_env_reads_the_process_environment() {
    env::set_var("DATABASE_URL", "postgres://env-host/farmlink");
    env::set_var("JWT_SECRET", "fedcba9876543210fedcba");
    env::set_var("SERVER_PORT", "9191");
    let cfg = AppConfig::from_env();
    env::remove_var("SERVER_PORT");
    env::remove_var("JWT_SECRET");
    env::remove_var("DATABASE_URL");

    let cfg = cfg.unwrap();
    assert_eq!(cfg.database_url, "postgres://env-host/farmlink");
    assert_eq!(cfg.server_port, 9191);
  }
}
