//! services/api/src/adapters/mail.rs
//!
//! Implementations of the `Mailer` port: the Resend HTTP API for production and a
//! log-only mailer for development setups without an API key.

use async_trait::async_trait;
use killfeed_core::ports::{Mailer, PortError, PortResult};
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(client: Client, api_key: String, from: String) -> Self {
        Self {
            client,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()> {
        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&OutgoingEmail {
                from: &self.from,
                to,
                subject,
                html: html_body,
            })
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Mail provider rejected message to {}: {} {}", to, status, detail);
            return Err(PortError::Unavailable(format!(
                "mail provider answered {status}"
            )));
        }

        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }
}

/// Writes outgoing mail to the log instead of delivering it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()> {
        info!(to, subject, "Not sending email (no RESEND_API_KEY):\n{}", html_body);
        Ok(())
    }
}
