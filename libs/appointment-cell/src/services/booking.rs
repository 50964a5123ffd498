// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{StoreError, SupabaseClient};
use shared_utils::timegrid::is_hhmm;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentPage, AppointmentStatus,
    CreateAppointmentRequest, SetStatusRequest, UpdateAppointmentRequest,
    DEFAULT_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::directory::PatientDirectoryService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::tokens::{CheckInTokenService, SequenceSource};

const DEFAULT_PAGE_SIZE: i32 = 50;
const MAX_PAGE_SIZE: i32 = 200;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    directory_service: PatientDirectoryService,
    token_service: CheckInTokenService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            directory_service: PatientDirectoryService::new(Arc::clone(&supabase)),
            token_service: CheckInTokenService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Same wiring, with an injected sequence source for check-in tokens.
    pub fn with_sequence(config: &AppConfig, sequence: Arc<dyn SequenceSource>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            directory_service: PatientDirectoryService::new(Arc::clone(&supabase)),
            token_service: CheckInTokenService::with_sequence(sequence),
            supabase,
        }
    }

    pub async fn create_appointment(
        &self,
        branch_id: Uuid,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {} on {}",
            request.patient_id, request.doctor_id, request.date
        );

        // **Step 1: Validate the requested slot shape**
        if !is_hhmm(&request.time) {
            return Err(AppointmentError::ValidationError(
                "Appointment time must use 24-hour HH:MM format".to_string(),
            ));
        }

        let duration = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration < MIN_DURATION_MINUTES {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment duration must be at least {} minutes",
                MIN_DURATION_MINUTES
            )));
        }

        // **Step 2: Snapshot the patient and doctor from the directories**
        let patient = self
            .directory_service
            .get_patient(request.patient_id, auth_token)
            .await?;
        let doctor = self
            .directory_service
            .get_doctor(request.doctor_id, auth_token)
            .await?;

        // **Step 3: Reject overlaps against active appointments**
        let has_conflict = self
            .conflict_service
            .has_conflict(
                branch_id,
                request.doctor_id,
                request.date,
                &request.time,
                duration,
                None,
                auth_token,
            )
            .await?;

        if has_conflict {
            return Err(AppointmentError::Conflict);
        }

        // **Step 4: Allocate a check-in token when a department was given**
        let check_in_token = match request.department_code.as_deref() {
            Some(department) => Some(
                self.token_service
                    .allocate(branch_id, department, request.date, auth_token)
                    .await?,
            ),
            None => None,
        };

        // **Step 5: Insert the appointment**
        // The read-time check above is not atomic under concurrency; the
        // store's unique guard on active slots turns a lost race into a
        // conflict instead of a double booking.
        let now = Utc::now().to_rfc3339();
        let appointment_data = json!({
            "branch_id": branch_id,
            "doctor_id": request.doctor_id,
            "patient_id": request.patient_id,
            "date": request.date,
            "time": request.time,
            "duration_minutes": duration,
            "status": AppointmentStatus::Scheduled,
            "priority": request.priority.unwrap_or_default(),
            "department_code": request.department_code,
            "doctor_name": doctor.full_name,
            "patient_name": patient.full_name,
            "patient_contact": patient.contact(),
            "check_in_token": check_in_token,
            "notes": request.notes,
            "created_at": now,
            "updated_at": now
        });

        let appointment = self.insert_appointment(appointment_data, auth_token).await?;
        info!("Appointment booked with ID: {}", appointment.id);

        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        branch_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&branch_id=eq.{}",
            appointment_id, branch_id
        );

        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)?;

        appointments
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        branch_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}", appointment_id);

        // **Step 1: The appointment must exist within this branch**
        let existing = self
            .get_appointment(appointment_id, branch_id, auth_token)
            .await?;

        // **Step 2: Validate whatever is changing**
        if let Some(time) = &request.time {
            if !is_hhmm(time) {
                return Err(AppointmentError::ValidationError(
                    "Appointment time must use 24-hour HH:MM format".to_string(),
                ));
            }
        }

        if let Some(duration) = request.duration_minutes {
            if duration < MIN_DURATION_MINUTES {
                return Err(AppointmentError::ValidationError(format!(
                    "Appointment duration must be at least {} minutes",
                    MIN_DURATION_MINUTES
                )));
            }
        }

        if request.reschedules() && existing.status.is_terminal() {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot reschedule a {} appointment",
                existing.status
            )));
        }

        // **Step 3: Re-run conflict detection when the slot moves**
        if request.reschedules() {
            let doctor_id = request.doctor_id.unwrap_or(existing.doctor_id);
            let date = request.date.unwrap_or(existing.date);
            let time = request.time.clone().unwrap_or_else(|| existing.time.clone());
            let duration = request
                .duration_minutes
                .unwrap_or(existing.duration_minutes);

            let has_conflict = self
                .conflict_service
                .has_conflict(
                    branch_id,
                    doctor_id,
                    date,
                    &time,
                    duration,
                    Some(appointment_id),
                    auth_token,
                )
                .await?;

            if has_conflict {
                return Err(AppointmentError::Conflict);
            }
        }

        // **Step 4: Patch only the provided fields**
        let mut update_data = Map::new();

        if let Some(doctor_id) = request.doctor_id {
            // Reassignment refreshes the denormalized doctor snapshot
            let doctor = self.directory_service.get_doctor(doctor_id, auth_token).await?;
            update_data.insert("doctor_id".to_string(), json!(doctor_id));
            update_data.insert("doctor_name".to_string(), json!(doctor.full_name));
        }
        if let Some(date) = request.date {
            update_data.insert("date".to_string(), json!(date));
        }
        if let Some(time) = request.time {
            update_data.insert("time".to_string(), json!(time));
        }
        if let Some(duration) = request.duration_minutes {
            update_data.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(priority) = request.priority {
            update_data.insert("priority".to_string(), json!(priority));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch_appointment(appointment_id, branch_id, Value::Object(update_data), auth_token)
            .await
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        branch_id: Uuid,
        actor_id: Uuid,
        request: SetStatusRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Setting appointment {} status to {}",
            appointment_id, request.status
        );

        // **Step 1: Load the current state**
        let existing = self
            .get_appointment(appointment_id, branch_id, auth_token)
            .await?;

        // **Step 2: The lifecycle table decides**
        self.lifecycle_service
            .validate_status_transition(&existing.status, &request.status)?;

        // **Step 3: Re-asserting the current status is a no-op**
        // Entry timestamps are stamped once, on first entry, so an
        // idempotent retry never duplicates them.
        if existing.status == request.status {
            return Ok(existing);
        }

        // **Step 4: Stamp entry effects and persist**
        let now = Utc::now();
        let mut update_data = Map::new();
        update_data.insert("status".to_string(), json!(request.status));

        match request.status {
            AppointmentStatus::InProgress => {
                update_data.insert("started_at".to_string(), json!(now.to_rfc3339()));
            }
            AppointmentStatus::Completed => {
                update_data.insert("completed_at".to_string(), json!(now.to_rfc3339()));
            }
            AppointmentStatus::Cancelled => {
                update_data.insert("cancelled_at".to_string(), json!(now.to_rfc3339()));
                update_data.insert("cancelled_by".to_string(), json!(actor_id));
                if let Some(reason) = &request.reason {
                    update_data.insert("cancellation_reason".to_string(), json!(reason));
                }
            }
            _ => {}
        }
        update_data.insert("updated_at".to_string(), json!(now.to_rfc3339()));

        self.patch_appointment(appointment_id, branch_id, Value::Object(update_data), auth_token)
            .await
    }

    pub async fn list_appointments(
        &self,
        branch_id: Uuid,
        query: AppointmentListQuery,
        auth_token: &str,
    ) -> Result<AppointmentPage, AppointmentError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0).max(0);

        let mut path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&order=date.asc,time.asc&limit={}&offset={}",
            branch_id, limit, offset
        );

        if let Some(doctor_id) = query.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(date_from) = query.date_from {
            path.push_str(&format!("&date=gte.{}", date_from));
        }
        if let Some(date_to) = query.date_to {
            path.push_str(&format!("&date=lte.{}", date_to));
        }

        let (items, total) = self
            .supabase
            .request_paged::<Appointment>(Method::GET, &path, Some(auth_token))
            .await
            .map_err(map_store_error)?;

        Ok(AppointmentPage { items, total })
    }

    async fn insert_appointment(
        &self,
        appointment_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(map_store_error)?;

        let row = result.first().ok_or_else(|| {
            AppointmentError::DatabaseError("Insert returned no appointment row".to_string())
        })?;

        serde_json::from_value(row.clone()).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        branch_id: Uuid,
        patch: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&branch_id=eq.{}",
            appointment_id, branch_id
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(patch), Some(headers))
            .await
            .map_err(map_store_error)?;

        // PATCH against a filter that matches nothing returns an empty set
        let row = result.first().ok_or(AppointmentError::NotFound)?;

        serde_json::from_value(row.clone()).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}

fn map_store_error(error: StoreError) -> AppointmentError {
    match error {
        StoreError::Conflict(_) => AppointmentError::Conflict,
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}
