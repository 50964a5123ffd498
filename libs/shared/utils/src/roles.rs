use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Permission strings gating the scheduling surface.
pub mod perms {
    pub const SCHEDULES_READ: &str = "schedules:read";
    pub const SCHEDULES_WRITE: &str = "schedules:write";
    pub const APPOINTMENTS_READ: &str = "appointments:read";
    pub const APPOINTMENTS_WRITE: &str = "appointments:write";
    pub const APPOINTMENTS_STATUS: &str = "appointments:status";
}

/// Role to permission-set cache. Owned by the application state and passed
/// down explicitly; there is deliberately no process-wide singleton here.
/// Lookups are lazily populated from the built-in seeds and can be
/// overridden or invalidated at runtime (e.g. after a role is edited).
#[derive(Clone)]
pub struct RoleCache {
    entries: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Union of the permissions of every role in `roles`.
    pub fn permissions_for(&self, roles: &[String]) -> Vec<String> {
        let mut permissions: Vec<String> = Vec::new();

        for role in roles {
            for permission in self.resolve(role) {
                if !permissions.iter().any(|existing| *existing == permission) {
                    permissions.push(permission);
                }
            }
        }

        permissions
    }

    /// Replace the cached permission set for a role.
    pub fn set_role(&self, role: &str, permissions: Vec<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(role.to_string(), permissions);
    }

    /// Drop a single role (next lookup re-resolves from seeds).
    pub fn invalidate(&self, role: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(role);
        debug!("Role cache entry invalidated: {}", role);
    }

    /// Drop every cached role.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        debug!("Role cache cleared");
    }

    fn resolve(&self, role: &str) -> Vec<String> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(permissions) = entries.get(role) {
                return permissions.clone();
            }
        }

        let seeded = Self::seed_permissions(role);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(role.to_string(), seeded.clone());
        seeded
    }

    fn seed_permissions(role: &str) -> Vec<String> {
        use perms::*;

        let seeded: &[&str] = match role {
            "admin" | "staff" => &[
                SCHEDULES_READ,
                SCHEDULES_WRITE,
                APPOINTMENTS_READ,
                APPOINTMENTS_WRITE,
                APPOINTMENTS_STATUS,
            ],
            "doctor" => &[SCHEDULES_READ, APPOINTMENTS_READ, APPOINTMENTS_STATUS],
            "patient" => &[SCHEDULES_READ, APPOINTMENTS_READ],
            _ => &[],
        };

        seeded.iter().map(|p| p.to_string()).collect()
    }
}

impl Default for RoleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_roles_resolve() {
        let cache = RoleCache::new();

        let staff = cache.permissions_for(&["staff".to_string()]);
        assert!(staff.contains(&perms::SCHEDULES_WRITE.to_string()));
        assert!(staff.contains(&perms::APPOINTMENTS_STATUS.to_string()));

        let patient = cache.permissions_for(&["patient".to_string()]);
        assert!(!patient.contains(&perms::APPOINTMENTS_WRITE.to_string()));
    }

    #[test]
    fn test_override_and_invalidate() {
        let cache = RoleCache::new();

        cache.set_role("doctor", vec!["schedules:read".to_string()]);
        let narrowed = cache.permissions_for(&["doctor".to_string()]);
        assert_eq!(narrowed, vec!["schedules:read".to_string()]);

        cache.invalidate("doctor");
        let reseeded = cache.permissions_for(&["doctor".to_string()]);
        assert!(reseeded.contains(&perms::APPOINTMENTS_STATUS.to_string()));
    }

    #[test]
    fn test_union_without_duplicates() {
        let cache = RoleCache::new();

        let both = cache.permissions_for(&["doctor".to_string(), "patient".to_string()]);
        let reads = both
            .iter()
            .filter(|p| p.as_str() == perms::SCHEDULES_READ)
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_unknown_role_is_empty() {
        let cache = RoleCache::new();
        assert!(cache.permissions_for(&["visitor".to_string()]).is_empty());
    }
}
