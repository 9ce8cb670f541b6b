use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{CalendarEvent, NotificationError};

/// External calendar, authenticated with the user's own OAuth token.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Creates the event and returns the provider's event id.
    async fn add_event(&self, token: &str, event: &CalendarEvent) -> Result<String, NotificationError>;

    async fn update_event(&self, token: &str, event_id: &str, event: &CalendarEvent) -> Result<(), NotificationError>;

    /// Deleting an event that no longer exists succeeds.
    async fn delete_event(&self, token: &str, event_id: &str) -> Result<(), NotificationError>;
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

/// Google Calendar v3 client against the user's primary calendar.
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.calendar_api_url.clone(),
        }
    }

    fn event_body(event: &CalendarEvent) -> Value {
        json!({
            "summary": event.summary,
            "description": event.description,
            "location": event.location,
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": "UTC" },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": "UTC" },
        })
    }

    async fn fail(response: reqwest::Response, action: &str) -> NotificationError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error!("Calendar {} failed: {} - {}", action, status, text);
        NotificationError::CalendarFailed {
            message: format!("HTTP {}: {}", status, text),
        }
    }
}

fn transport(e: reqwest::Error) -> NotificationError {
    NotificationError::CalendarFailed { message: e.to_string() }
}

#[async_trait]
impl CalendarSync for GoogleCalendarClient {
    async fn add_event(&self, token: &str, event: &CalendarEvent) -> Result<String, NotificationError> {
        let url = format!("{}/calendars/primary/events", self.base_url);
        debug!("Creating calendar event '{}'", event.summary);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&Self::event_body(event))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "create").await);
        }

        let created: CreatedEvent = response.json().await.map_err(transport)?;
        info!("Calendar event created: {}", created.id);
        Ok(created.id)
    }

    async fn update_event(&self, token: &str, event_id: &str, event: &CalendarEvent) -> Result<(), NotificationError> {
        let url = format!("{}/calendars/primary/events/{}", self.base_url, event_id);
        debug!("Updating calendar event {}", event_id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&Self::event_body(event))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "update").await);
        }

        Ok(())
    }

    async fn delete_event(&self, token: &str, event_id: &str) -> Result<(), NotificationError> {
        let url = format!("{}/calendars/primary/events/{}", self.base_url, event_id);
        debug!("Deleting calendar event {}", event_id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!("Calendar event {} already absent", event_id);
                Ok(())
            }
            _ => Err(Self::fail(response, "delete").await),
        }
    }
}
