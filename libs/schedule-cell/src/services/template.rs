use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{StoreError, SupabaseClient};
use shared_utils::timegrid::{is_hhmm, to_minutes};

use crate::models::{BreakPeriod, ScheduleError, ScheduleTemplate, UpsertTemplateRequest, Window};

pub struct TemplateService {
    supabase: SupabaseClient,
}

impl TemplateService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create or replace the weekly template for (branch, doctor, weekday).
    /// The template key is enforced by the store; a repeat upsert merges
    /// into the existing row instead of duplicating it.
    pub async fn upsert_template(
        &self,
        branch_id: Uuid,
        request: UpsertTemplateRequest,
        auth_token: &str,
    ) -> Result<ScheduleTemplate, ScheduleError> {
        debug!(
            "Upserting template for doctor {} weekday {}",
            request.doctor_id, request.day_of_week
        );

        if request.day_of_week < 0 || request.day_of_week > 6 {
            return Err(ScheduleError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        for window in &request.windows {
            validate_window(window)?;
        }
        for break_period in &request.breaks {
            validate_period("Break", &break_period.from, &break_period.to)?;
        }
        for exception in &request.exceptions {
            for block in &exception.blocks {
                validate_period("Exception block", &block.from, &block.to)?;
            }
        }

        let template_data = json!({
            "branch_id": branch_id,
            "doctor_id": request.doctor_id,
            "day_of_week": request.day_of_week,
            "windows": request.windows,
            "breaks": request.breaks,
            "exceptions": request.exceptions,
            "updated_at": chrono::Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "return=representation,resolution=merge-duplicates",
            ),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedule_templates?on_conflict=branch_id,doctor_id,day_of_week",
                Some(auth_token),
                Some(template_data),
                Some(headers),
            )
            .await
            .map_err(map_store_error)?;

        let row = result
            .first()
            .ok_or_else(|| ScheduleError::DatabaseError("Upsert returned no template row".to_string()))?;

        let template: ScheduleTemplate = serde_json::from_value(row.clone())
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;
        debug!("Template upserted with ID: {}", template.id);

        Ok(template)
    }

    /// Fetch one template by its key within the branch.
    pub async fn get_template(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<ScheduleTemplate, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_templates?branch_id=eq.{}&doctor_id=eq.{}&day_of_week=eq.{}",
            branch_id, doctor_id, day_of_week
        );

        let templates: Vec<ScheduleTemplate> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)?;

        templates
            .into_iter()
            .next()
            .ok_or(ScheduleError::TemplateNotFound)
    }

    /// All weekly templates for a doctor, optionally narrowed to one weekday.
    pub async fn list_templates(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        day_of_week: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleTemplate>, ScheduleError> {
        let mut path = format!(
            "/rest/v1/schedule_templates?branch_id=eq.{}&doctor_id=eq.{}&order=day_of_week.asc",
            branch_id, doctor_id
        );
        if let Some(day) = day_of_week {
            path.push_str(&format!("&day_of_week=eq.{}", day));
        }

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)
    }
}

fn validate_window(window: &Window) -> Result<(), ScheduleError> {
    validate_period("Window", &window.from, &window.to)
}

fn validate_period(label: &str, from: &str, to: &str) -> Result<(), ScheduleError> {
    if !is_hhmm(from) || !is_hhmm(to) {
        return Err(ScheduleError::ValidationError(format!(
            "{} times must use 24-hour HH:MM format",
            label
        )));
    }

    if to_minutes(from) >= to_minutes(to) {
        return Err(ScheduleError::ValidationError(format!(
            "{} start time must be before end time",
            label
        )));
    }

    Ok(())
}

pub(crate) fn map_store_error(error: StoreError) -> ScheduleError {
    match error {
        StoreError::Conflict(message) => ScheduleError::Conflict(message),
        other => ScheduleError::DatabaseError(other.to_string()),
    }
}
