// libs/appointment-cell/src/services/conflict.rs
use chrono::NaiveDate;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_utils::timegrid::{overlap, to_minutes};

use crate::models::{Appointment, AppointmentError};

/// Statuses that participate in conflict detection, as a PostgREST filter.
const ACTIVE_STATUS_FILTER: &str = "status=in.(scheduled,confirmed,in-progress)";

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Check whether the proposed interval overlaps any active appointment
    /// for the same doctor and date within the branch.
    ///
    /// This read-time check keeps error messages early and friendly, but it
    /// is not the last line of defense: the store enforces a uniqueness
    /// guard on active slots, so two concurrent requests for the same slot
    /// cannot both commit.
    pub async fn has_conflict(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking conflicts for doctor {} on {} at {} ({} min)",
            doctor_id, date, time, duration_minutes
        );

        let existing = self
            .active_appointments_for_day(branch_id, doctor_id, date, exclude_appointment_id, auth_token)
            .await?;

        let proposed_start = to_minutes(time);

        Ok(existing.iter().any(|appointment| {
            appointment.status.is_active()
                && overlap(
                    proposed_start,
                    duration_minutes,
                    to_minutes(&appointment.time),
                    appointment.duration_minutes,
                )
        }))
    }

    async fn active_appointments_for_day(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&doctor_id=eq.{}&date=eq.{}&{}",
            branch_id, doctor_id, date, ACTIVE_STATUS_FILTER
        );

        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}
