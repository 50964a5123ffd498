// libs/appointment-cell/src/services/directory.rs
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, DoctorSummary, PatientSummary};

/// Read-only view over the patient and doctor directories. Booking embeds
/// a snapshot of the names (and patient contact) into the appointment row.
pub struct PatientDirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl PatientDirectoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<PatientSummary, AppointmentError> {
        debug!("Looking up patient {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);

        let patients: Vec<PatientSummary> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        patients
            .into_iter()
            .next()
            .ok_or(AppointmentError::PatientNotFound)
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorSummary, AppointmentError> {
        debug!("Looking up doctor {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);

        let doctors: Vec<DoctorSummary> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        doctors
            .into_iter()
            .next()
            .ok_or(AppointmentError::DoctorNotFound)
    }
}
