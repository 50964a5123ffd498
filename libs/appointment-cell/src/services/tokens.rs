// libs/appointment-cell/src/services/tokens.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Source of the next check-in sequence number for one
/// (branch, department, date) scope. Injectable so callers can swap the
/// store-backed counter for a deterministic one in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SequenceSource: Send + Sync {
    async fn next_value(
        &self,
        branch_id: Uuid,
        department_code: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i64, AppointmentError>;
}

/// Store-backed counter. The increment happens inside a database function,
/// so concurrent allocations in the same scope never observe the same
/// value and tokens stay collision-free.
pub struct CounterSequence {
    supabase: Arc<SupabaseClient>,
}

impl CounterSequence {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SequenceSource for CounterSequence {
    async fn next_value(
        &self,
        branch_id: Uuid,
        department_code: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i64, AppointmentError> {
        let body = json!({
            "p_branch_id": branch_id,
            "p_department_code": department_code,
            "p_date": date,
        });

        self.supabase
            .request(
                Method::POST,
                "/rest/v1/rpc/next_check_in_seq",
                Some(auth_token),
                Some(body),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}

pub struct CheckInTokenService {
    sequence: Arc<dyn SequenceSource>,
}

impl CheckInTokenService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            sequence: Arc::new(CounterSequence::new(supabase)),
        }
    }

    pub fn with_sequence(sequence: Arc<dyn SequenceSource>) -> Self {
        Self { sequence }
    }

    /// Allocate the next check-in token for a department on a given date,
    /// e.g. "CAR001", "CAR002", ...
    pub async fn allocate(
        &self,
        branch_id: Uuid,
        department_code: &str,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<String, AppointmentError> {
        let sequence = self
            .sequence
            .next_value(branch_id, department_code, date, auth_token)
            .await?;

        let token = format_token(department_code, sequence);
        debug!("Allocated check-in token {} for {}", token, date);

        Ok(token)
    }
}

/// Token shape: up to three alphanumeric characters of the department code,
/// uppercased, followed by the zero-padded sequence number. Sequences past
/// 999 simply widen the numeric part.
pub fn format_token(department_code: &str, sequence: i64) -> String {
    let prefix: String = department_code
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();

    format!("{}{:03}", prefix, sequence)
}
