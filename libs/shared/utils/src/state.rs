use shared_config::AppConfig;

use crate::roles::RoleCache;

/// Shared application state threaded through every router.
///
/// The role cache lives here rather than in a process-wide static so tests
/// and embedders can construct isolated instances with their own seeds.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub role_cache: RoleCache,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            role_cache: RoleCache::new(),
        }
    }

    pub fn with_role_cache(config: AppConfig, role_cache: RoleCache) -> Self {
        Self { config, role_cache }
    }
}
