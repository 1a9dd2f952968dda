// marketplace/src/services/sms.rs

//! SMS delivery over an ordered list of HTTP providers with a log-only tail.

use crate::config::{AfricasTalkingConfig, AppConfig, TermiiConfig, TwilioConfig};
use crate::services::email::DeliveryError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait SmsProvider: Send + Sync {
  fn name(&self) -> &str;
  async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError>;
}

/// `+` followed by 8 to 15 digits, first digit non-zero.
pub fn is_e164(number: &str) -> bool {
  let Some(digits) = number.strip_prefix('+') else {
    return false;
  };
  (8..=15).contains(&digits.len())
    && digits.chars().all(|c| c.is_ascii_digit())
    && !digits.starts_with('0')
}

async fn check_response(provider: &str, resp: Result<reqwest::Response, reqwest::Error>) -> Result<(), DeliveryError> {
  let resp = resp.map_err(|e| DeliveryError::Transport {
    provider: provider.to_string(),
    reason: e.to_string(),
  })?;
  let status = resp.status();
  if status.is_success() {
    return Ok(());
  }
  let body = resp.text().await.unwrap_or_default();
  Err(DeliveryError::Rejected {
    provider: provider.to_string(),
    reason: format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>()),
  })
}

pub struct TwilioProvider {
  config: TwilioConfig,
  client: reqwest::Client,
}

impl TwilioProvider {
  pub fn new(config: TwilioConfig) -> Self {
    Self {
      config,
      client: reqwest::Client::new(),
    }
  }

  fn endpoint(&self) -> String {
    format!(
      "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
      self.config.account_sid
    )
  }
}

#[async_trait]
impl SmsProvider for TwilioProvider {
  fn name(&self) -> &str {
    "twilio"
  }

  async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
    let resp = self
      .client
      .post(self.endpoint())
      .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
      .form(&[("To", to), ("From", self.config.from_number.as_str()), ("Body", body)])
      .send()
      .await;
    check_response(self.name(), resp).await
  }
}

pub struct AfricasTalkingProvider {
  config: AfricasTalkingConfig,
  client: reqwest::Client,
}

impl AfricasTalkingProvider {
  pub fn new(config: AfricasTalkingConfig) -> Self {
    Self {
      config,
      client: reqwest::Client::new(),
    }
  }

  fn form<'a>(&'a self, to: &'a str, body: &'a str) -> Vec<(&'static str, &'a str)> {
    let mut form = vec![("username", self.config.username.as_str()), ("to", to), ("message", body)];
    if let Some(sender) = &self.config.sender_id {
      form.push(("from", sender.as_str()));
    }
    form
  }
}

#[async_trait]
impl SmsProvider for AfricasTalkingProvider {
  fn name(&self) -> &str {
    "africastalking"
  }

  async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
    let resp = self
      .client
      .post("https://api.africastalking.com/version1/messaging")
      .header("apiKey", &self.config.api_key)
      .header("Accept", "application/json")
      .form(&self.form(to, body))
      .send()
      .await;
    check_response(self.name(), resp).await
  }
}

pub struct TermiiProvider {
  config: TermiiConfig,
  client: reqwest::Client,
}

impl TermiiProvider {
  pub fn new(config: TermiiConfig) -> Self {
    Self {
      config,
      client: reqwest::Client::new(),
    }
  }

  /// Termii wants the number without the leading `+`.
  fn payload(&self, to: &str, body: &str) -> serde_json::Value {
    json!({
      "to": to.trim_start_matches('+'),
      "from": self.config.sender_id,
      "sms": body,
      "type": "plain",
      "channel": "generic",
      "api_key": self.config.api_key,
    })
  }
}

#[async_trait]
impl SmsProvider for TermiiProvider {
  fn name(&self) -> &str {
    "termii"
  }

  async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
    let resp = self
      .client
      .post("https://api.ng-termii.com/api/sms/send")
      .json(&self.payload(to, body))
      .send()
      .await;
    check_response(self.name(), resp).await
  }
}

#[derive(Debug, Default)]
pub struct LogOnlySms;

#[async_trait]
impl SmsProvider for LogOnlySms {
  fn name(&self) -> &str {
    "log"
  }

  async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
    info!(%to, len = body.len(), "SMS not sent (no provider configured).");
    debug!(%body, "SMS body.");
    Ok(())
  }
}

pub struct SmsDispatcher {
  providers: Vec<Arc<dyn SmsProvider>>,
}

impl SmsDispatcher {
  pub fn new(providers: Vec<Arc<dyn SmsProvider>>) -> Self {
    Self { providers }
  }

  /// Providers named in `SMS_PROVIDER_ORDER` that have credentials, then the log sink.
  pub fn from_config(config: &AppConfig) -> Self {
    let mut providers: Vec<Arc<dyn SmsProvider>> = Vec::new();
    for name in &config.sms_provider_order {
      match name.as_str() {
        "twilio" => {
          if let Some(c) = &config.twilio {
            providers.push(Arc::new(TwilioProvider::new(c.clone())));
          }
        }
        "africastalking" => {
          if let Some(c) = &config.africas_talking {
            providers.push(Arc::new(AfricasTalkingProvider::new(c.clone())));
          }
        }
        "termii" => {
          if let Some(c) = &config.termii {
            providers.push(Arc::new(TermiiProvider::new(c.clone())));
          }
        }
        other => warn!(provider = %other, "Unknown SMS provider in SMS_PROVIDER_ORDER, ignoring."),
      }
    }
    providers.push(Arc::new(LogOnlySms));
    Self::new(providers)
  }

  pub fn provider_names(&self) -> Vec<&str> {
    self.providers.iter().map(|p| p.name()).collect()
  }

  /// Returns the name of the provider that accepted the message.
  #[instrument(name = "sms::send", skip(self, body), fields(to = %to))]
  pub async fn send(&self, to: &str, body: &str) -> Result<String, DeliveryError> {
    if !is_e164(to) {
      return Err(DeliveryError::InvalidAddress(to.to_string()));
    }
    let mut failures = Vec::new();
    for provider in &self.providers {
      match provider.send(to, body).await {
        Ok(()) => return Ok(provider.name().to_string()),
        Err(e) => {
          warn!(provider = provider.name(), error = %e, "SMS provider failed, trying next.");
          failures.push(e.to_string());
        }
      }
    }
    Err(DeliveryError::Exhausted(failures))
  }
}
