pub mod models;
pub mod services;

pub use models::*;
pub use services::calendar::{CalendarSync, GoogleCalendarClient};
pub use services::email::{EmailDispatcher, HttpEmailClient};
pub use services::notification::{NotificationDispatcher, SupabaseNotificationStore};
