use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<Uuid>,
    pub app_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Resolve the tenant scope for this token: a top-level `branch_id`
    /// claim wins, falling back to `app_metadata.branch_id`.
    pub fn branch_scope(&self) -> Option<Uuid> {
        if let Some(branch_id) = self.branch_id {
            return Some(branch_id);
        }

        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get("branch_id"))
            .and_then(|value| value.as_str())
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// Collect role names from the `role` claim plus any
    /// `app_metadata.roles` array.
    pub fn role_names(&self) -> Vec<String> {
        let mut roles = Vec::new();

        if let Some(role) = &self.role {
            roles.push(role.clone());
        }

        if let Some(extra) = self
            .app_metadata
            .as_ref()
            .and_then(|meta| meta.get("roles"))
            .and_then(|value| value.as_array())
        {
            for entry in extra {
                if let Some(name) = entry.as_str() {
                    if !roles.iter().any(|existing| existing == name) {
                        roles.push(name.to_string());
                    }
                }
            }
        }

        roles
    }
}

/// Per-request authorization context, built once by the auth middleware and
/// threaded explicitly through handlers and services. Scheduling code never
/// re-derives actor or branch from request internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub actor_id: Uuid,
    pub branch_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl AuthorizationContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
