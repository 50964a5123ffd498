use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::timegrid::{between, overlap, slot_times, to_minutes};

use crate::models::{
    BookedInterval, DayAvailability, ScheduleBlock, ScheduleError, ScheduleTemplate, SlotStatus,
    SlotView,
};
use crate::services::template::map_store_error;

/// Reference width used when checking a slot against booked appointments.
/// Deliberately independent of each window's own step size.
pub const DEFAULT_SLOT_REFERENCE_MINUTES: i32 = 30;

/// Longest date range a single availability query may span.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Statuses that occupy calendar time. Terminal appointments never mark a
/// slot booked.
const ACTIVE_STATUS_FILTER: &str = "status=in.(scheduled,confirmed,in-progress)";

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    slot_reference_minutes: i32,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_slot_reference(config, DEFAULT_SLOT_REFERENCE_MINUTES)
    }

    pub fn with_slot_reference(config: &AppConfig, slot_reference_minutes: i32) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            slot_reference_minutes,
        }
    }

    /// Derive the day-by-day slot grid for one doctor across an inclusive
    /// date range. Reads templates, blocks and active appointments up front,
    /// then composes each day in memory; nothing derived here is persisted.
    pub async fn compute_availability(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DayAvailability>, ScheduleError> {
        if date_from > date_to {
            return Err(ScheduleError::ValidationError(
                "date_from must not be after date_to".to_string(),
            ));
        }

        let span_days = (date_to - date_from).num_days() + 1;
        if span_days > MAX_RANGE_DAYS {
            return Err(ScheduleError::ValidationError(format!(
                "Date range cannot exceed {} days",
                MAX_RANGE_DAYS
            )));
        }

        debug!(
            "Computing availability for doctor {} from {} to {}",
            doctor_id, date_from, date_to
        );

        let templates = self.load_templates(branch_id, doctor_id, auth_token).await?;
        let blocks = self
            .load_blocks(branch_id, doctor_id, date_from, date_to, auth_token)
            .await?;
        let appointments = self
            .load_active_appointments(branch_id, doctor_id, date_from, date_to, auth_token)
            .await?;

        let mut days = Vec::with_capacity(span_days as usize);
        let mut current = date_from;
        while current <= date_to {
            days.push(self.compose_day(current, &templates, &blocks, &appointments));
            current += Duration::days(1);
        }

        Ok(days)
    }

    /// Build one day's grid. Blocking sources run before booking detection,
    /// and a blocked slot is never re-marked booked.
    pub fn compose_day(
        &self,
        date: NaiveDate,
        templates: &[ScheduleTemplate],
        blocks: &[ScheduleBlock],
        appointments: &[BookedInterval],
    ) -> DayAvailability {
        let weekday = date.weekday().num_days_from_sunday() as i32;
        let template = templates.iter().find(|t| t.day_of_week == weekday);

        let mut slots: Vec<SlotView> = Vec::new();

        if let Some(template) = template {
            for window in &template.windows {
                for time in slot_times(&window.from, &window.to, window.step_minutes) {
                    slots.push(SlotView {
                        time,
                        status: SlotStatus::Available,
                    });
                }
            }
            slots.sort_by_key(|slot| to_minutes(&slot.time));

            for break_period in &template.breaks {
                mark_blocked(&mut slots, &break_period.from, &break_period.to);
            }

            if let Some(exception) = template.exceptions.iter().find(|e| e.date == date) {
                for block in &exception.blocks {
                    mark_blocked(&mut slots, &block.from, &block.to);
                }
            }
        }

        for block in blocks.iter().filter(|b| b.date == date) {
            mark_blocked(&mut slots, &block.from, &block.to);
        }

        for appointment in appointments.iter().filter(|a| a.date == date) {
            let appointment_start = to_minutes(&appointment.time);
            for slot in slots.iter_mut() {
                if slot.status == SlotStatus::Available
                    && overlap(
                        to_minutes(&slot.time),
                        self.slot_reference_minutes,
                        appointment_start,
                        appointment.duration_minutes,
                    )
                {
                    slot.status = SlotStatus::Booked;
                }
            }
        }

        DayAvailability { date, slots }
    }

    async fn load_templates(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ScheduleTemplate>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_templates?branch_id=eq.{}&doctor_id=eq.{}",
            branch_id, doctor_id
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)
    }

    async fn load_blocks(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_blocks?branch_id=eq.{}&doctor_id=eq.{}&date=gte.{}&date=lte.{}",
            branch_id, doctor_id, date_from, date_to
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)
    }

    async fn load_active_appointments(
        &self,
        branch_id: Uuid,
        doctor_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&doctor_id=eq.{}&date=gte.{}&date=lte.{}&{}",
            branch_id, doctor_id, date_from, date_to, ACTIVE_STATUS_FILTER
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_store_error)
    }
}

fn mark_blocked(slots: &mut [SlotView], from: &str, to: &str) {
    let start = to_minutes(from);
    let end = to_minutes(to);

    for slot in slots.iter_mut() {
        if between(&slot.time, start, end) {
            slot.status = SlotStatus::Blocked;
        }
    }
}
