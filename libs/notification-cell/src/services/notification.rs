use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_database::supabase::SupabaseClient;

use crate::models::{Notification, NotificationError};

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// In-app notifications are rows in the `notifications` table; the web app
/// polls them per user.
pub struct SupabaseNotificationStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationDispatcher for SupabaseNotificationStore {
    async fn create_notification(&self, notification: &Notification) -> Result<(), NotificationError> {
        debug!("Creating {:?} notification for user {}", notification.kind, notification.user_id);

        let mut row = json!(notification);
        row["is_read"] = json!(false);

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                None,
                Some(row),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| NotificationError::NotificationFailed { message: e.to_string() })?;

        Ok(())
    }
}
