use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::AuthorizationContext;

use crate::supabase::SupabaseClient;

/// A single audit record. Everything needed to answer "who did what to
/// which record, in which branch, when".
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub branch_id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub detail: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        ctx: &AuthorizationContext,
        action: &str,
        entity: &str,
        entity_id: Uuid,
        detail: Value,
    ) -> Self {
        Self {
            actor_id: ctx.actor_id,
            branch_id: ctx.branch_id,
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id,
            detail,
            recorded_at: Utc::now(),
        }
    }
}

/// Fire-and-forget sink for audit events. Writes happen on a spawned task;
/// failures are logged and never reach the primary operation.
#[derive(Clone)]
pub struct AuditSink {
    supabase: SupabaseClient,
}

impl AuditSink {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    pub fn record(&self, event: AuditEvent, auth_token: &str) {
        let supabase = self.supabase.clone();
        let token = auth_token.to_string();

        tokio::spawn(async move {
            if let Err(e) = Self::insert(&supabase, &event, &token).await {
                warn!(
                    "Failed to record audit event {} for {} {}: {}",
                    event.action, event.entity, event.entity_id, e
                );
            }
        });
    }

    async fn insert(supabase: &SupabaseClient, event: &AuditEvent, token: &str) -> Result<()> {
        let row = json!({
            "actor_id": event.actor_id,
            "branch_id": event.branch_id,
            "action": event.action,
            "entity": event.entity,
            "entity_id": event.entity_id,
            "detail": event.detail,
            "recorded_at": event.recorded_at.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/audit_events",
                Some(token),
                Some(row),
                Some(headers),
            )
            .await?;

        debug!(
            "Audit event {} recorded for {} {}",
            event.action, event.entity, event.entity_id
        );

        Ok(())
    }
}
