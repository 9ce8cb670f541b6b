use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{EmailMessage, NotificationError};

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Transactional email provider reached over HTTP.
/// POST {EMAIL_API_URL}/emails with a bearer API key.
/// Without EMAIL_API_URL and EMAIL_API_KEY every send fails with
/// `NotConfigured` instead of reaching the network.
pub struct HttpEmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
    configured: bool,
}

impl HttpEmailClient {
    pub fn new(config: &AppConfig) -> Self {
        let configured = config.is_email_configured();
        if !configured {
            warn!("Email provider not configured, emails will not be sent");
        }

        Self {
            client: Client::new(),
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from_address: config.email_from_address.clone(),
            configured,
        }
    }
}

#[async_trait]
impl EmailDispatcher for HttpEmailClient {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if !self.configured {
            return Err(NotificationError::NotConfigured);
        }

        let url = format!("{}/emails", self.api_url);
        debug!("Sending {:?} email to {}", message.template, message.to);

        let body = json!({
            "from": self.from_address,
            "to": [message.to],
            "subject": message.subject,
            "template": message.template,
            "data": message.data,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotificationError::EmailFailed { message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Email provider rejected message: {} - {}", status, text);
            return Err(NotificationError::EmailFailed {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        info!("Email '{}' sent to {}", message.subject, message.to);
        Ok(())
    }
}
