use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::AuthorizationContext;

use crate::roles::RoleCache;
use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
        }
    }

    pub fn to_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(self.to_app_config()))
    }

    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub branch_id: Uuid,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "staff".to_string(),
            branch_id: Uuid::new_v4(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            branch_id: Uuid::new_v4(),
        }
    }

    pub fn in_branch(email: &str, role: &str, branch_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            branch_id,
        }
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    /// Build the context the auth middleware would have produced for this
    /// user, resolving permissions through the given cache.
    pub fn to_context(&self, role_cache: &RoleCache) -> AuthorizationContext {
        let roles = vec![self.role.clone()];
        let permissions = role_cache.permissions_for(&roles);

        AuthorizationContext {
            actor_id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::new_v4()),
            branch_id: self.branch_id,
            roles,
            permissions,
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "branch_id": user.branch_id,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        Self::sign_payload(payload, secret)
    }

    /// Token with no branch claim anywhere; the middleware must reject it.
    pub fn create_branchless_token(user: &TestUser, secret: &str) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(24);

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        Self::sign_payload(payload, secret)
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

    fn sign_payload(payload: serde_json::Value, secret: &str) -> String {
        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }
}

pub struct MockScheduleRows;

impl MockScheduleRows {
    pub fn template_row(branch_id: Uuid, doctor_id: Uuid, day_of_week: i32) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "branch_id": branch_id,
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "windows": [
                {"from": "09:00", "to": "12:00", "step_minutes": 30},
                {"from": "13:00", "to": "17:00", "step_minutes": 30}
            ],
            "breaks": [
                {"from": "12:00", "to": "13:00"}
            ],
            "exceptions": [],
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn block_row(
        branch_id: Uuid,
        doctor_id: Uuid,
        date: &str,
        from: &str,
        to: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "branch_id": branch_id,
            "doctor_id": doctor_id,
            "date": date,
            "from": from,
            "to": to,
            "reason": "Staff meeting",
            "created_by": Uuid::new_v4(),
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        branch_id: Uuid,
        doctor_id: Uuid,
        date: &str,
        time: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "branch_id": branch_id,
            "doctor_id": doctor_id,
            "patient_id": Uuid::new_v4(),
            "date": date,
            "time": time,
            "duration_minutes": 30,
            "status": status,
            "priority": "normal",
            "department_code": "GEN",
            "doctor_name": "Dr. Test Doctor",
            "patient_name": "Test Patient",
            "patient_contact": "+15550100",
            "check_in_token": null,
            "notes": null,
            "started_at": null,
            "completed_at": null,
            "cancelled_at": null,
            "cancelled_by": null,
            "cancellation_reason": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn doctor_row(doctor_id: Uuid) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "full_name": "Dr. Test Doctor",
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn patient_row(patient_id: Uuid) -> serde_json::Value {
        json!({
            "id": patient_id,
            "full_name": "Test Patient",
            "phone": "+15550100",
            "email": "patient@example.com",
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}
