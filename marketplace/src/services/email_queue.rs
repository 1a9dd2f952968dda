// marketplace/src/services/email_queue.rs

//! In-process delivery queue in front of [`FallbackMailer`].
//!
//! Messages are sent one at a time. A failed send goes to the back of the
//! queue with an exponential delay; after `max_retries` retries it is dropped.
//! The queue is not persisted.

use crate::services::email::{EmailMessage, FallbackMailer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
struct QueuedEmail {
  message: EmailMessage,
  attempts: u32,
  not_before: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
  /// Nothing was due.
  Idle,
  Sent { transport: String },
  Retrying { attempts: u32, delay: Duration },
  Dropped { attempts: u32 },
}

pub struct EmailQueue {
  mailer: Arc<FallbackMailer>,
  entries: Mutex<VecDeque<QueuedEmail>>,
  max_retries: u32,
  base_backoff: Duration,
}

impl EmailQueue {
  pub fn new(mailer: Arc<FallbackMailer>, max_retries: u32, base_backoff: Duration) -> Self {
    Self {
      mailer,
      entries: Mutex::new(VecDeque::new()),
      max_retries,
      base_backoff,
    }
  }

  pub fn enqueue(&self, message: EmailMessage) {
    debug!(to = %message.to, subject = %message.subject, "Email queued.");
    self.entries.lock().push_back(QueuedEmail {
      message,
      attempts: 0,
      not_before: Instant::now(),
    });
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  /// Delay before retry number `attempts` (1-based): `base * 2^(attempts-1)`.
  pub fn backoff_for(&self, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(20);
    self.base_backoff.saturating_mul(1u32 << exponent)
  }

  /// Takes the first due entry, rotating not-yet-due ones to the back. One pass at most.
  fn take_due(&self, now: Instant) -> Option<QueuedEmail> {
    let mut entries = self.entries.lock();
    for _ in 0..entries.len() {
      let entry = entries.pop_front()?;
      if entry.not_before <= now {
        return Some(entry);
      }
      entries.push_back(entry);
    }
    None
  }

  #[instrument(name = "email_queue::process_next", skip(self, now))]
  pub async fn process_next(&self, now: Instant) -> QueueOutcome {
    let Some(mut entry) = self.take_due(now) else {
      return QueueOutcome::Idle;
    };

    match self.mailer.send(&entry.message).await {
      Ok(transport) => {
        info!(to = %entry.message.to, %transport, attempts = entry.attempts + 1, "Queued email delivered.");
        QueueOutcome::Sent { transport }
      }
      Err(e) => {
        entry.attempts += 1;
        if entry.attempts > self.max_retries {
          error!(
            to = %entry.message.to,
            subject = %entry.message.subject,
            attempts = entry.attempts,
            error = %e,
            "Dropping email after exhausting retries."
          );
          return QueueOutcome::Dropped {
            attempts: entry.attempts,
          };
        }
        let delay = self.backoff_for(entry.attempts);
        warn!(to = %entry.message.to, attempts = entry.attempts, delay_ms = delay.as_millis() as u64, error = %e, "Email delivery failed, will retry.");
        entry.not_before = now + delay;
        let attempts = entry.attempts;
        self.entries.lock().push_back(entry);
        QueueOutcome::Retrying { attempts, delay }
      }
    }
  }

  /// Worker task: one `process_next` per tick.
  pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        self.process_next(Instant::now()).await;
      }
    })
  }
}
