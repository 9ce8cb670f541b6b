use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Clinic, Veterinarian, VetError};

/// Lookup of vets and clinics. Absent rows come back as `None`; callers
/// decide whether that is an error.
#[async_trait]
pub trait VetDirectory: Send + Sync {
    async fn get_veterinarian(&self, vet_id: Uuid) -> Result<Option<Veterinarian>, VetError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Veterinarian>, VetError>;

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, VetError>;
}

pub struct SupabaseVetDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseVetDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn first_row<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, VetError> {
        let result: Vec<Value> = self.supabase.request(Method::GET, path, None, None).await?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VetDirectory for SupabaseVetDirectory {
    async fn get_veterinarian(&self, vet_id: Uuid) -> Result<Option<Veterinarian>, VetError> {
        debug!("Fetching veterinarian: {}", vet_id);
        self.first_row(&format!("/rest/v1/veterinarians?id=eq.{}", vet_id)).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Veterinarian>, VetError> {
        debug!("Fetching veterinarian for user: {}", user_id);
        self.first_row(&format!("/rest/v1/veterinarians?user_id=eq.{}", user_id)).await
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, VetError> {
        debug!("Fetching clinic: {}", clinic_id);
        self.first_row(&format!("/rest/v1/clinics?id=eq.{}", clinic_id)).await
    }
}
