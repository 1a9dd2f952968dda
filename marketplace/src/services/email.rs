// marketplace/src/services/email.rs

//! Outbound email: one trait, three transports and an ordered fallback chain.

use crate::config::{AppConfig, SendGridConfig, SmtpConfig};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
  pub to: String,
  pub subject: String,
  pub html_body: String,
  pub text_body: String,
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
  #[error("{provider} rejected the message: {reason}")]
  Rejected { provider: String, reason: String },

  #[error("{provider} could not be reached: {reason}")]
  Transport { provider: String, reason: String },

  #[error("invalid address: {0}")]
  InvalidAddress(String),

  #[error("all providers failed: {}", .0.join("; "))]
  Exhausted(Vec<String>),
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
  fn name(&self) -> &str;
  async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

pub struct SendGridTransport {
  api_key: String,
  sender: String,
  endpoint: String,
  client: reqwest::Client,
}

impl SendGridTransport {
  pub fn new(config: &SendGridConfig, sender: &str) -> Self {
    Self {
      api_key: config.api_key.clone(),
      sender: sender.to_string(),
      endpoint: SENDGRID_ENDPOINT.to_string(),
      client: reqwest::Client::new(),
    }
  }

  fn payload(&self, message: &EmailMessage) -> serde_json::Value {
    json!({
      "personalizations": [{ "to": [{ "email": message.to }] }],
      "from": { "email": self.sender },
      "subject": message.subject,
      "content": [
        { "type": "text/plain", "value": message.text_body },
        { "type": "text/html", "value": message.html_body }
      ]
    })
  }
}

#[async_trait]
impl EmailTransport for SendGridTransport {
  fn name(&self) -> &str {
    "sendgrid"
  }

  async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
    let resp = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.api_key)
      .json(&self.payload(message))
      .send()
      .await
      .map_err(|e| DeliveryError::Transport {
        provider: self.name().to_string(),
        reason: e.to_string(),
      })?;

    let status = resp.status();
    if status.is_success() {
      return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
      provider: self.name().to_string(),
      reason: format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>()),
    })
  }
}

pub struct SmtpTransport {
  sender: String,
  mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
  /// STARTTLS relay; credentials are attached when both username and password are set.
  pub fn new(config: &SmtpConfig, sender: &str) -> Result<Self, DeliveryError> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
      .map_err(|e| DeliveryError::Transport {
        provider: "smtp".to_string(),
        reason: e.to_string(),
      })?
      .port(config.port);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
      builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    Ok(Self {
      sender: sender.to_string(),
      mailer: builder.build(),
    })
  }

  fn build_message(&self, message: &EmailMessage) -> Result<Message, DeliveryError> {
    let from: Mailbox = self
      .sender
      .parse()
      .map_err(|_| DeliveryError::InvalidAddress(self.sender.clone()))?;
    let to: Mailbox = message
      .to
      .parse()
      .map_err(|_| DeliveryError::InvalidAddress(message.to.clone()))?;
    Message::builder()
      .from(from)
      .to(to)
      .subject(message.subject.clone())
      .multipart(MultiPart::alternative_plain_html(
        message.text_body.clone(),
        message.html_body.clone(),
      ))
      .map_err(|e| DeliveryError::Rejected {
        provider: "smtp".to_string(),
        reason: e.to_string(),
      })
  }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
  fn name(&self) -> &str {
    "smtp"
  }

  async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
    let email = self.build_message(message)?;
    self.mailer.send(email).await.map(|_| ()).map_err(|e| DeliveryError::Transport {
      provider: self.name().to_string(),
      reason: e.to_string(),
    })
  }
}

/// Development sink. Always succeeds.
#[derive(Debug, Default)]
pub struct LogOnlyTransport;

#[async_trait]
impl EmailTransport for LogOnlyTransport {
  fn name(&self) -> &str {
    "log"
  }

  async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
    info!(to = %message.to, subject = %message.subject, "Email not sent (no provider configured).");
    debug!(body = %message.text_body, "Email body.");
    Ok(())
  }
}

/// Tries each transport in order and stops at the first success.
pub struct FallbackMailer {
  transports: Vec<Arc<dyn EmailTransport>>,
}

impl FallbackMailer {
  pub fn new(transports: Vec<Arc<dyn EmailTransport>>) -> Self {
    Self { transports }
  }

  /// SendGrid (when keyed), then SMTP (when a host is set), then the log sink.
  pub fn from_config(config: &AppConfig) -> Self {
    let mut transports: Vec<Arc<dyn EmailTransport>> = Vec::new();
    if let Some(sg) = &config.sendgrid {
      transports.push(Arc::new(SendGridTransport::new(sg, &config.email_sender)));
    }
    if let Some(smtp) = &config.smtp {
      match SmtpTransport::new(smtp, &config.email_sender) {
        Ok(t) => transports.push(Arc::new(t)),
        Err(e) => warn!(error = %e, host = %smtp.host, "SMTP transport disabled."),
      }
    }
    transports.push(Arc::new(LogOnlyTransport));
    info!(order = ?transports.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(), "Email transports ready.");
    Self::new(transports)
  }

  pub fn transport_names(&self) -> Vec<&str> {
    self.transports.iter().map(|t| t.name()).collect()
  }

  /// Returns the name of the transport that delivered the message.
  #[instrument(name = "email::send", skip(self, message), fields(to = %message.to, subject = %message.subject))]
  pub async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError> {
    let mut failures = Vec::new();
    for transport in &self.transports {
      match transport.send(message).await {
        Ok(()) => {
          debug!(transport = transport.name(), "Email delivered.");
          return Ok(transport.name().to_string());
        }
        Err(e) => {
          warn!(transport = transport.name(), error = %e, "Email transport failed, trying next.");
          failures.push(e.to_string());
        }
      }
    }
    Err(DeliveryError::Exhausted(failures))
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use parking_lot::Mutex;
  use std::collections::VecDeque;

  /// Transport whose outcomes are scripted per call. Runs out to success.
  pub(crate) struct ScriptedTransport {
    pub(crate) name: &'static str,
    pub(crate) outcomes: Mutex<VecDeque<bool>>,
    pub(crate) sent: Mutex<Vec<EmailMessage>>,
    pub(crate) calls: Mutex<usize>,
  }

  impl ScriptedTransport {
    pub(crate) fn new(name: &'static str, outcomes: &[bool]) -> Arc<Self> {
      Arc::new(Self {
        name,
        outcomes: Mutex::new(outcomes.iter().copied().collect()),
        sent: Mutex::new(Vec::new()),
        calls: Mutex::new(0),
      })
    }

    pub(crate) fn always_failing(name: &'static str) -> Arc<Self> {
      Self::new(name, &[false; 64])
    }

    pub(crate) fn calls(&self) -> usize {
      *self.calls.lock()
    }
  }

  #[async_trait]
  impl EmailTransport for ScriptedTransport {
    fn name(&self) -> &str {
      self.name
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
      *self.calls.lock() += 1;
      let ok = self.outcomes.lock().pop_front().unwrap_or(true);
      if ok {
        self.sent.lock().push(message.clone());
        Ok(())
      } else {
        Err(DeliveryError::Transport {
          provider: self.name.to_string(),
          reason: "scripted failure".to_string(),
        })
      }
    }
  }

  pub(crate) fn mailer_of(transports: &[&Arc<ScriptedTransport>]) -> FallbackMailer {
    FallbackMailer::new(
      transports
        .iter()
        .map(|t| Arc::clone(t) as Arc<dyn EmailTransport>)
        .collect(),
    )
  }

  pub(crate) fn message(to: &str) -> EmailMessage {
    EmailMessage {
      to: to.to_string(),
      subject: "Hello".to_string(),
      html_body: "<p>Hi</p>".to_string(),
      text_body: "Hi".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::{mailer_of, message, ScriptedTransport};
  use super::*;
  use crate::config::tests::base_env;

  #[tokio::test]
  async fn first_success_wins() {
    let primary = ScriptedTransport::new("primary", &[true]);
    let secondary = ScriptedTransport::new("secondary", &[true]);
    let mailer = mailer_of(&[&primary, &secondary]);

    assert_eq!(mailer.send(&message("a@example.com")).await.unwrap(), "primary");
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
  }

  #[tokio::test]
  async fn falls_through_in_order() {
    let primary = ScriptedTransport::always_failing("primary");
    let secondary = ScriptedTransport::always_failing("secondary");
    let last = ScriptedTransport::new("last", &[true]);
    let mailer = mailer_of(&[&primary, &secondary, &last]);

    assert_eq!(mailer.send(&message("a@example.com")).await.unwrap(), "last");
    assert_eq!((primary.calls(), secondary.calls(), last.calls()), (1, 1, 1));
    assert_eq!(last.sent.lock()[0].to, "a@example.com");
  }

  #[tokio::test]
  async fn exhausted_lists_every_failure() {
    let one = ScriptedTransport::always_failing("one");
    let two = ScriptedTransport::always_failing("two");
    let mailer = mailer_of(&[&one, &two]);
    match mailer.send(&message("a@example.com")).await {
      Err(DeliveryError::Exhausted(failures)) => {
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("one"));
        assert!(failures[1].contains("two"));
      }
      other => panic!("expected Exhausted, got {:?}", other),
    }
  }

  #[test]
  fn config_order_is_sendgrid_smtp_log() {
    let mut env = base_env();
    let bare = crate::config::AppConfig::from_source(&env).unwrap();
    assert_eq!(FallbackMailer::from_config(&bare).transport_names(), vec!["log"]);

    env.insert("SENDGRID_API_KEY".into(), "SG.key".into());
    env.insert("SMTP_HOST".into(), "smtp.example.com".into());
    let full = crate::config::AppConfig::from_source(&env).unwrap();
    assert_eq!(
      FallbackMailer::from_config(&full).transport_names(),
      vec!["sendgrid", "smtp", "log"]
    );
  }

  #[test]
  fn sendgrid_payload_carries_both_bodies() {
    let transport = SendGridTransport::new(&SendGridConfig { api_key: "k".into() }, "noreply@farmlink.local");
    let payload = transport.payload(&message("b@example.com"));
    assert_eq!(payload["personalizations"][0]["to"][0]["email"], "b@example.com");
    assert_eq!(payload["from"]["email"], "noreply@farmlink.local");
    assert_eq!(payload["content"][0]["type"], "text/plain");
    assert_eq!(payload["content"][1]["value"], "<p>Hi</p>");
  }

  #[tokio::test]
  async fn log_only_always_succeeds() {
    assert!(LogOnlyTransport.send(&message("x@example.com")).await.is_ok());
  }
}
