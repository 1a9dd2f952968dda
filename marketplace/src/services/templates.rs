// marketplace/src/services/templates.rs

//! Transactional email and SMS bodies.

use crate::models::OrderStatus;
use crate::services::email::EmailMessage;
use uuid::Uuid;

pub fn format_money(cents: i64, currency: &str) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}{} {}.{:02}", sign, currency, abs / 100, abs % 100)
}

fn short_id(id: Uuid) -> String {
  id.simple().to_string()[..8].to_ascii_uppercase()
}

fn html_escape(input: &str) -> String {
  input
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

fn build(to: &str, subject: String, greeting_name: &str, paragraphs: &[String], action: Option<(&str, &str)>) -> EmailMessage {
  let mut html = format!("<p>Hi {},</p>", html_escape(greeting_name));
  let mut text = format!("Hi {},\n\n", greeting_name);
  for p in paragraphs {
    html.push_str(&format!("<p>{}</p>", html_escape(p)));
    text.push_str(p);
    text.push_str("\n\n");
  }
  if let Some((label, url)) = action {
    html.push_str(&format!(
      "<p><a href=\"{}\">{}</a></p>",
      html_escape(url),
      html_escape(label)
    ));
    text.push_str(&format!("{}: {}\n\n", label, url));
  }
  html.push_str("<p>The FarmLink team</p>");
  text.push_str("The FarmLink team\n");
  EmailMessage {
    to: to.to_string(),
    subject,
    html_body: html,
    text_body: text,
  }
}

pub fn verification_email(to: &str, name: &str, link: &str) -> EmailMessage {
  build(
    to,
    "Verify your FarmLink email address".to_string(),
    name,
    &["Confirm your email address to finish setting up your FarmLink account.".to_string()],
    Some(("Verify email", link)),
  )
}

pub fn password_reset_email(to: &str, name: &str, link: &str) -> EmailMessage {
  build(
    to,
    "Reset your FarmLink password".to_string(),
    name,
    &[
      "We received a request to reset your password.".to_string(),
      "If you did not ask for this, you can ignore this email.".to_string(),
    ],
    Some(("Choose a new password", link)),
  )
}

pub fn welcome_email(to: &str, name: &str, pending_approval: bool, dashboard_url: &str) -> EmailMessage {
  let mut paragraphs = vec!["Your email address is verified. Welcome to FarmLink!".to_string()];
  if pending_approval {
    paragraphs.push("An administrator will review your account shortly. We will email you once it is approved.".to_string());
  }
  build(to, "Welcome to FarmLink".to_string(), name, &paragraphs, Some(("Open your dashboard", dashboard_url)))
}

pub fn account_approved_email(to: &str, name: &str, login_url: &str) -> EmailMessage {
  build(
    to,
    "Your FarmLink account is approved".to_string(),
    name,
    &["Your account has been approved. You can now publish listings and trade on FarmLink.".to_string()],
    Some(("Sign in", login_url)),
  )
}

pub fn farmer_onboarded_email(to: &str, name: &str, partner_name: &str, link: &str) -> EmailMessage {
  build(
    to,
    "You have been registered on FarmLink".to_string(),
    name,
    &[format!(
      "{} has created a FarmLink account for you. Set a password to sign in.",
      partner_name
    )],
    Some(("Set your password", link)),
  )
}

pub struct OrderSummary<'a> {
  pub order_id: Uuid,
  pub listing_title: &'a str,
  pub quantity_kg: f64,
  pub total_cents: i64,
  pub currency: &'a str,
}

pub fn order_placed_email(to: &str, farmer_name: &str, order: &OrderSummary<'_>, orders_url: &str) -> EmailMessage {
  build(
    to,
    format!("New order #{} for {}", short_id(order.order_id), order.listing_title),
    farmer_name,
    &[format!(
      "A buyer ordered {} kg of {} for {}. Please confirm the order.",
      order.quantity_kg,
      order.listing_title,
      format_money(order.total_cents, order.currency)
    )],
    Some(("Review order", orders_url)),
  )
}

pub fn order_placed_sms(order: &OrderSummary<'_>) -> String {
  format!(
    "FarmLink: new order #{} - {} kg of {} ({}).",
    short_id(order.order_id),
    order.quantity_kg,
    order.listing_title,
    format_money(order.total_cents, order.currency)
  )
}

pub fn order_status_email(to: &str, name: &str, order_id: Uuid, status: OrderStatus, orders_url: &str) -> EmailMessage {
  let line = match status {
    OrderStatus::Pending => "is waiting for the farmer".to_string(),
    OrderStatus::Confirmed => "was confirmed by the farmer".to_string(),
    OrderStatus::Shipped => "is on its way".to_string(),
    OrderStatus::Delivered => "was delivered".to_string(),
    OrderStatus::Cancelled => "was cancelled".to_string(),
  };
  build(
    to,
    format!("Order #{} update", short_id(order_id)),
    name,
    &[format!("Your order #{} {}.", short_id(order_id), line)],
    Some(("View order", orders_url)),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn money_formatting() {
    assert_eq!(format_money(1250, "GHS"), "GHS 12.50");
    assert_eq!(format_money(5, "KES"), "KES 0.05");
    assert_eq!(format_money(-300, "NGN"), "-NGN 3.00");
  }

  #[test]
  fn verification_email_contains_link_in_both_bodies() {
    let link = "https://app.farmlink.local/verify-email?token=abc";
    let msg = verification_email("ama@example.com", "Ama", link);
    assert_eq!(msg.to, "ama@example.com");
    assert!(msg.text_body.contains(link));
    assert!(msg.html_body.contains("href=\"https://app.farmlink.local/verify-email?token=abc\""));
  }

  #[test]
  fn names_are_escaped_in_html() {
    let msg = welcome_email("x@example.com", "<b>Kofi</b>", false, "https://x");
    assert!(msg.html_body.contains("&lt;b&gt;Kofi&lt;/b&gt;"));
    assert!(msg.text_body.contains("<b>Kofi</b>"));
  }

  #[test]
  fn order_messages_mention_total() {
    let summary = OrderSummary {
      order_id: Uuid::new_v4(),
      listing_title: "Maize",
      quantity_kg: 20.0,
      total_cents: 4000,
      currency: "GHS",
    };
    assert!(order_placed_email("f@example.com", "Kwame", &summary, "https://x")
      .text_body
      .contains("GHS 40.00"));
    assert!(order_placed_sms(&summary).contains("20 kg of Maize"));
  }
}
