//! Donor receipt emails. Fire-and-forget: callers log failures and move on;
//! a receipt that never sends must not fail a recorded donation.

use anyhow::{anyhow, Result};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::config::EmailConfig;
use crate::models::Donation;

#[derive(Clone)]
pub struct ReceiptMailer {
    config: EmailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl ReceiptMailer {
    pub fn new(config: EmailConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let credentials = Credentials::new(
            config.smtp_user.clone(),
            config.smtp_password.expose_secret().clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| anyhow!("failed to create SMTP relay: {e}"))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Send a confirmation email for a recorded donation. A donation without
    /// a donor email is skipped silently.
    pub async fn send_receipt(&self, donation: &Donation) -> Result<()> {
        let (Some(transport), Some(recipient)) =
            (self.transport.as_ref(), donation.donor_email.as_deref())
        else {
            tracing::debug!(donation_id = %donation.id, "receipt email skipped");
            return Ok(());
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| anyhow!("invalid from address: {e}"))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| anyhow!("invalid recipient address: {e}"))?;

        let receipt_number = donation
            .metadata
            .receipt_number
            .as_deref()
            .unwrap_or("(unassigned)");
        let body = format!(
            "Dear {},\n\n\
             Thank you for your donation of {:.2} {} ({}).\n\
             Receipt number: {}\n\
             Transaction id: {}\n\n\
             With gratitude,\n{}\n",
            donation.donor_name,
            donation.amount,
            donation.currency,
            donation.donation_type.as_str(),
            receipt_number,
            donation.metadata.transaction_id.as_deref().unwrap_or("-"),
            self.config.from_name,
        );

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Donation receipt {receipt_number}"))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("failed to build receipt email: {e}"))?;

        transport
            .send(message)
            .await
            .map_err(|e| anyhow!("failed to send receipt email: {e}"))?;

        tracing::info!(
            donation_id = %donation.id,
            to = recipient,
            "receipt email sent"
        );
        Ok(())
    }
}
