use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound mail delivery seam. The production implementation talks SMTP;
/// tests substitute a recording implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> Result<()>;
}

/// SMTP relay delivery via lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    site_name: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, site_name: &str) -> Result<Self> {
        let credentials =
            Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .with_context(|| format!("Invalid SMTP relay host: {}", config.host))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
            site_name: site_name.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> Result<()> {
        let from = format!("\"{}\" <{}>", self.site_name, self.from_address)
            .parse()
            .context("Invalid sender address")?;
        let to_mailbox = to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", to))?;

        let builder = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject);

        let email = match html {
            Some(html) => builder
                .multipart(MultiPart::alternative_plain_html(
                    text.to_string(),
                    html.to_string(),
                ))
                .context("Failed to build email")?,
            None => builder
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text.to_string()),
                )
                .context("Failed to build email")?,
        };

        self.transport
            .send(email)
            .await
            .with_context(|| format!("SMTP delivery to {} failed", to))?;

        info!("Sent mail to {}: {}", to, subject);
        Ok(())
    }
}

/// Welcome email sent when a visitor starts their first chat; carries the
/// chat key they need to resume the conversation elsewhere.
pub fn welcome_email(chat_key: &str, site_name: &str) -> (String, String, String) {
    let subject = "Thank you for chatting with me!".to_string();
    let text = format!(
        "Thanks for reaching out! Use the chat key {} to continue the conversation on any device.",
        chat_key
    );
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; color: #333; line-height: 1.6; padding: 20px; max-width: 600px; margin: auto; border: 1px solid #e2e8f0; border-radius: 8px; background-color: #f9fafb;">
  <h2 style="color: #2563eb; text-align: center;">Thank You for Chatting with Me!</h2>
  <p style="font-size: 16px; text-align: center;">
    It was a pleasure interacting with you. To continue your chat on other devices, please use the chat key below:
  </p>
  <div style="text-align: center; margin: 20px 0;">
    <span style="display: inline-block; padding: 10px 20px; font-size: 18px; font-weight: bold; background-color: #2563eb; color: #fff; border-radius: 6px;">{chat_key}</span>
  </div>
  <p style="font-size: 14px; color: #555; text-align: center;">
    Keep this key safe. It allows you to continue your conversation securely.
  </p>
  <hr style="border: none; border-top: 1px solid #e2e8f0; margin: 20px 0;">
  <p style="font-size: 12px; color: #888; text-align: center;">
    &copy; {year} {site_name}. All rights reserved.
  </p>
</div>"#,
        chat_key = chat_key,
        year = chrono::Utc::now().format("%Y"),
        site_name = site_name,
    );

    (subject, text, html)
}
