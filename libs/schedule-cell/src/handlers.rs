// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_database::audit::{AuditEvent, AuditSink};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::AuthorizationContext;
use shared_models::error::AppError;
use shared_utils::roles::perms;
use shared_utils::state::AppState;

use crate::models::{
    AvailabilityQueryParams, AvailabilityResponse, BlockQueryParams, CreateBlockRequest,
    ScheduleError, TemplateQueryParams, UpsertTemplateRequest,
};
use crate::services::{AvailabilityService, BlockService, TemplateService};

// ==============================================================================
// TEMPLATE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn upsert_template(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Json(request): Json<UpsertTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::SCHEDULES_WRITE) {
        return Err(AppError::Auth("Not authorized to manage schedules".to_string()));
    }

    let service = TemplateService::new(&state.config);
    let template = service
        .upsert_template(context.branch_id, request, token)
        .await
        .map_err(map_schedule_error)?;

    let audit = AuditSink::new(SupabaseClient::new(&state.config));
    audit.record(
        AuditEvent::new(
            &context,
            "schedule.template_upserted",
            "schedule_template",
            template.id,
            json!({
                "doctor_id": template.doctor_id,
                "day_of_week": template.day_of_week,
                "windows": template.windows.len(),
            }),
        ),
        token,
    );

    Ok(Json(json!(template)))
}

#[axum::debug_handler]
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Query(params): Query<TemplateQueryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::SCHEDULES_READ) {
        return Err(AppError::Auth("Not authorized to view schedules".to_string()));
    }

    let service = TemplateService::new(&state.config);
    let templates = service
        .list_templates(context.branch_id, params.doctor_id, params.day_of_week, token)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(templates)))
}

// ==============================================================================
// BLOCK HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Json(request): Json<CreateBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::SCHEDULES_WRITE) {
        return Err(AppError::Auth("Not authorized to manage schedules".to_string()));
    }

    let service = BlockService::new(&state.config);
    let block = service
        .create_block(context.branch_id, context.actor_id, request, token)
        .await
        .map_err(map_schedule_error)?;

    let audit = AuditSink::new(SupabaseClient::new(&state.config));
    audit.record(
        AuditEvent::new(
            &context,
            "schedule.block_created",
            "schedule_block",
            block.id,
            json!({
                "doctor_id": block.doctor_id,
                "date": block.date,
                "from": block.from,
                "to": block.to,
            }),
        ),
        token,
    );

    Ok(Json(json!(block)))
}

#[axum::debug_handler]
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Query(params): Query<BlockQueryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::SCHEDULES_READ) {
        return Err(AppError::Auth("Not authorized to view schedules".to_string()));
    }

    let service = BlockService::new(&state.config);
    let blocks = service
        .list_blocks(
            context.branch_id,
            params.doctor_id,
            params.date_from,
            params.date_to,
            token,
        )
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(blocks)))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(context): Extension<AuthorizationContext>,
    Query(params): Query<AvailabilityQueryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !context.has_permission(perms::SCHEDULES_READ) {
        return Err(AppError::Auth("Not authorized to view schedules".to_string()));
    }

    let service = AvailabilityService::new(&state.config);
    let days = service
        .compute_availability(
            context.branch_id,
            params.doctor_id,
            params.date_from,
            params.date_to,
            token,
        )
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(AvailabilityResponse { days })))
}

fn map_schedule_error(error: ScheduleError) -> AppError {
    match error {
        ScheduleError::TemplateNotFound => {
            AppError::NotFound("Schedule template not found".to_string())
        }
        ScheduleError::ValidationError(message) => AppError::ValidationError(message),
        ScheduleError::Conflict(message) => AppError::Conflict(message),
        ScheduleError::DatabaseError(message) => AppError::Database(message),
    }
}
