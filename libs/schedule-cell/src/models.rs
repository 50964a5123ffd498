use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// SCHEDULE TEMPLATES
// ==============================================================================

/// One contiguous working interval within a weekly template. Slot start
/// times are derived from it at `step_minutes` granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub from: String,
    pub to: String,
    pub step_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakPeriod {
    pub from: String,
    pub to: String,
}

/// Date-specific deviation from the weekly pattern. Blocks listed here are
/// applied only when availability is computed for this exact date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateException {
    pub date: NaiveDate,
    pub blocks: Vec<BreakPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub windows: Vec<Window>,
    #[serde(default)]
    pub breaks: Vec<BreakPeriod>,
    #[serde(default)]
    pub exceptions: Vec<DateException>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// AD-HOC BLOCKS
// ==============================================================================

/// One-off unavailability for a doctor on a single date, independent of the
/// weekly template (emergencies, meetings, leave).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// DERIVED AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Blocked,
    Booked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotView {
    pub time: String,
    pub status: SlotStatus,
}

/// Slots are derived on every read; they are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub days: Vec<DayAvailability>,
}

/// Appointment row as read for availability composition. Only the fields
/// that influence slot status are deserialized here.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedInterval {
    pub date: NaiveDate,
    pub time: String,
    pub duration_minutes: i32,
    pub status: String,
}

// ==============================================================================
// REQUEST / QUERY TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTemplateRequest {
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub windows: Vec<Window>,
    #[serde(default)]
    pub breaks: Vec<BreakPeriod>,
    #[serde(default)]
    pub exceptions: Vec<DateException>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateQueryParams {
    pub doctor_id: Uuid,
    pub day_of_week: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockQueryParams {
    pub doctor_id: Uuid,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQueryParams {
    pub doctor_id: Uuid,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Schedule template not found")]
    TemplateNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Schedule conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
