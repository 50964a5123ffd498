// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::audit::{AuditEvent, AuditSink};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::AuthorizationContext;
use shared_models::error::AppError;
use shared_utils::roles::perms;
use shared_utils::state::AppState;

use crate::models::{
    AppointmentError, AppointmentListQuery, CreateAppointmentRequest, SetStatusRequest,
    UpdateAppointmentRequest,
};
use crate::services::AppointmentBookingService;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::APPOINTMENTS_WRITE) {
        return Err(AppError::Auth("Not authorized to book appointments".to_string()));
    }

    let service = AppointmentBookingService::new(&state.config);
    let appointment = service
        .create_appointment(context.branch_id, request, token)
        .await
        .map_err(map_appointment_error)?;

    let audit = AuditSink::new(SupabaseClient::new(&state.config));
    audit.record(
        AuditEvent::new(
            &context,
            "appointment.created",
            "appointment",
            appointment.id,
            json!({
                "doctor_id": appointment.doctor_id,
                "patient_id": appointment.patient_id,
                "date": appointment.date,
                "time": appointment.time,
                "check_in_token": appointment.check_in_token,
            }),
        ),
        token,
    );

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::APPOINTMENTS_READ) {
        return Err(AppError::Auth("Not authorized to view appointments".to_string()));
    }

    let service = AppointmentBookingService::new(&state.config);
    let appointment = service
        .get_appointment(appointment_id, context.branch_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::APPOINTMENTS_WRITE) {
        return Err(AppError::Auth("Not authorized to modify appointments".to_string()));
    }

    let service = AppointmentBookingService::new(&state.config);
    let appointment = service
        .update_appointment(appointment_id, context.branch_id, request, token)
        .await
        .map_err(map_appointment_error)?;

    let audit = AuditSink::new(SupabaseClient::new(&state.config));
    audit.record(
        AuditEvent::new(
            &context,
            "appointment.updated",
            "appointment",
            appointment.id,
            json!({
                "doctor_id": appointment.doctor_id,
                "date": appointment.date,
                "time": appointment.time,
                "duration_minutes": appointment.duration_minutes,
            }),
        ),
        token,
    );

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn set_appointment_status(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::APPOINTMENTS_STATUS) {
        return Err(AppError::Auth(
            "Not authorized to change appointment status".to_string(),
        ));
    }

    let new_status = request.status;
    let service = AppointmentBookingService::new(&state.config);
    let appointment = service
        .set_status(appointment_id, context.branch_id, context.actor_id, request, token)
        .await
        .map_err(map_appointment_error)?;

    let audit = AuditSink::new(SupabaseClient::new(&state.config));
    audit.record(
        AuditEvent::new(
            &context,
            "appointment.status_changed",
            "appointment",
            appointment.id,
            json!({
                "status": new_status,
            }),
        ),
        token,
    );

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::APPOINTMENTS_READ) {
        return Err(AppError::Auth("Not authorized to view appointments".to_string()));
    }

    let service = AppointmentBookingService::new(&state.config);
    let page = service
        .list_appointments(context.branch_id, query, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(page)))
}

fn map_appointment_error(error: AppointmentError) -> AppError {
    match error {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::Conflict => {
            AppError::Conflict("Appointment conflicts with existing booking".to_string())
        }
        AppointmentError::InvalidTransition { from, to } => AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        },
        AppointmentError::ValidationError(message) => AppError::ValidationError(message),
        AppointmentError::DatabaseError(message) => AppError::Database(message),
    }
}
