use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, SideEffectMode};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub email_api_url: String,
    pub calendar_api_url: String,
    pub side_effect_mode: SideEffectMode,
    pub serialize_bookings: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            email_api_url: "http://localhost:54322".to_string(),
            calendar_api_url: "http://localhost:54323".to_string(),
            side_effect_mode: SideEffectMode::Inline,
            serialize_bookings: true,
        }
    }
}

impl TestConfig {
    /// Points every outbound client at one mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            email_api_url: uri.to_string(),
            calendar_api_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            email_api_url: self.email_api_url.clone(),
            email_api_key: "test-email-key".to_string(),
            email_from_address: "appointments@vetclinic.test".to_string(),
            calendar_api_url: self.calendar_api_url.clone(),
            redis_url: None,
            side_effect_mode: self.side_effect_mode,
            serialize_bookings: self.serialize_bookings,
            outbox_max_retries: 3,
            outbox_retry_delay_seconds: 0,
            api_port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::owner("owner@example.com")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn with_id(id: Uuid, email: &str, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn owner(email: &str) -> Self {
        Self::new(email, "owner")
    }

    pub fn vet(email: &str) -> Self {
        Self::new(email, "vet")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// PostgREST row fixtures for the scheduling tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn profile_response(user_id: &str, calendar_token: Option<&str>) -> serde_json::Value {
        json!({
            "id": user_id,
            "email": "owner@example.com",
            "full_name": "Test Owner",
            "calendar_token": calendar_token
        })
    }

    pub fn pet_response(pet_id: Uuid, public_id: Uuid, owner_user_id: &str) -> serde_json::Value {
        json!({
            "id": pet_id,
            "public_id": public_id,
            "owner_user_id": owner_user_id,
            "name": "Biscuit",
            "species": "dog",
            "breed": "Beagle"
        })
    }

    pub fn veterinarian_response(vet_id: Uuid, user_id: &str, clinic_id: Uuid) -> serde_json::Value {
        json!({
            "id": vet_id,
            "user_id": user_id,
            "clinic_id": clinic_id,
            "full_name": "Dr. Test Vet",
            "email": "vet@example.com",
            "specialization": "Small animals",
            "license_number": "VET-12345"
        })
    }

    pub fn clinic_response(clinic_id: Uuid) -> serde_json::Value {
        json!({
            "id": clinic_id,
            "name": "Riverside Animal Clinic",
            "address": "1 River Road",
            "phone": "+1 555 0100"
        })
    }

    pub fn availability_response(
        vet_id: Uuid,
        clinic_id: Uuid,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "vet_id": vet_id,
            "clinic_id": clinic_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "is_available": true
        })
    }

    pub fn appointment_response(
        id: i64,
        public_id: Uuid,
        pet_id: Uuid,
        vet_id: Uuid,
        clinic_id: Uuid,
        appointment_date: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "public_id": public_id,
            "pet_id": pet_id,
            "vet_id": vet_id,
            "clinic_id": clinic_id,
            "appointment_date": appointment_date,
            "duration_minutes": 30,
            "appointment_type": "wellness_exam",
            "notes": null,
            "status": status,
            "metadata": {},
            "created_at": "2025-04-01T00:00:00Z",
            "updated_at": "2025-04-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
