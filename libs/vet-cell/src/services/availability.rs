use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityWindow, VetError, SLOT_MINUTES};

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// All recurring weekly windows of a vet, across clinics.
    async fn list_availability(&self, vet_id: Uuid) -> Result<Vec<AvailabilityWindow>, VetError>;
}

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn list_availability(&self, vet_id: Uuid) -> Result<Vec<AvailabilityWindow>, VetError> {
        debug!("Fetching availability for vet: {}", vet_id);

        let path = format!(
            "/rest/v1/vet_availability?vet_id=eq.{}&order=day_of_week.asc,start_time.asc",
            vet_id
        );
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        let windows = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()?;

        Ok(windows)
    }
}

/// Day-of-week index used by availability windows: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Lazy sequence of slot starts on one date, `SLOT_MINUTES` apart, stopping
/// strictly before the window end.
#[derive(Debug, Clone)]
pub struct SlotStarts {
    next: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SlotStarts {
    pub fn for_window(window: &AvailabilityWindow, date: NaiveDate) -> Self {
        Self {
            next: date.and_time(window.start_time).and_utc(),
            end: date.and_time(window.end_time).and_utc(),
        }
    }

    pub fn empty() -> Self {
        Self {
            next: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl Iterator for SlotStarts {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = current + Duration::minutes(SLOT_MINUTES);
        Some(current)
    }
}

pub struct AvailabilityResolver {
    store: Arc<dyn AvailabilityStore>,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store }
    }

    /// Candidate slot starts for `vet_id` at `clinic_id` on `date`. A day with
    /// no window, or a window marked unavailable, yields an empty sequence.
    pub async fn resolve_slots(
        &self,
        vet_id: Uuid,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<SlotStarts, VetError> {
        let weekday = day_of_week(date);
        let windows = self.store.list_availability(vet_id).await?;

        let window = windows
            .iter()
            .find(|w| w.clinic_id == clinic_id && w.day_of_week == weekday);

        match window {
            Some(window) if window.is_available => {
                debug!(
                    "Vet {} works {}-{} on day {} at clinic {}",
                    vet_id, window.start_time, window.end_time, weekday, clinic_id
                );
                Ok(SlotStarts::for_window(window, date))
            }
            _ => {
                debug!("Vet {} unavailable on {} at clinic {}", vet_id, date, clinic_id);
                Ok(SlotStarts::empty())
            }
        }
    }

    pub async fn weekly_schedule(&self, vet_id: Uuid) -> Result<Vec<AvailabilityWindow>, VetError> {
        self.store.list_availability(vet_id).await
    }
}
