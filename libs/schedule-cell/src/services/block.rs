use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::timegrid::{is_hhmm, to_minutes};

use crate::models::{CreateBlockRequest, ScheduleBlock, ScheduleError};
use crate::services::template::map_store_error;

pub struct BlockService {
    supabase: SupabaseClient,
}

impl BlockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Record an ad-hoc unavailability interval for a doctor on one date.
    pub async fn create_block(
        &self,
        branch_id: Uuid,
        created_by: Uuid,
        request: CreateBlockRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        debug!(
            "Creating schedule block for doctor {} on {}",
            request.doctor_id, request.date
        );

        if !is_hhmm(&request.from) || !is_hhmm(&request.to) {
            return Err(ScheduleError::ValidationError(
                "Block times must use 24-hour HH:MM format".to_string(),
            ));
        }

        if to_minutes(&request.from) >= to_minutes(&request.to) {
            return Err(ScheduleError::ValidationError(
                "Block start time must be before end time".to_string(),
            ));
        }

        let block_data = json!({
            "branch_id": branch_id,
            "doctor_id": request.doctor_id,
            "date": request.date,
            "from": request.from,
            "to": request.to,
            "reason": request.reason,
            "created_by": created_by,
            "created_at": chrono::Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedule_blocks",
                Some(auth_token),
                Some(block_data),
                Some(headers),
            )
            .await
            .map_err(map_store_error)?;

        let row = result
            .first()
            .ok_or_else(|| ScheduleError::DatabaseError("Insert returned no block row".to_string()))?;

        let block: ScheduleBlock = serde_json::from_value(row.clone())
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;
        debug!("Schedule block created with ID: {}", block.id);

        Ok(block)
    }

    /// Blocks for a doctor across an inclusive date range.
    pub async fn list_blocks(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_blocks?branch_id=eq.{}&doctor_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc",
            branch_id, doctor_id, date_from, date_to
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)
    }
}
