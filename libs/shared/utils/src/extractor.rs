use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use uuid::Uuid;

use shared_models::auth::AuthorizationContext;
use shared_models::error::AppError;

use crate::jwt::validate_token;
use crate::state::AppState;

// Middleware for authentication and branch scoping. Builds the full
// AuthorizationContext once per request; handlers only read the extension.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Extract token from headers
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth("Invalid authorization header format".to_string()));
    }

    let token = &auth_value[7..];

    // Validate token
    let claims = validate_token(token, &state.config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    let actor_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Auth("Invalid subject claim".to_string()))?;

    // Every scheduling operation is branch-scoped; a token without a branch
    // cannot act on anything.
    let branch_id = claims
        .branch_scope()
        .ok_or_else(|| AppError::BranchContext("Token carries no branch scope".to_string()))?;

    let roles = claims.role_names();
    let permissions = state.role_cache.permissions_for(&roles);

    let context = AuthorizationContext {
        actor_id,
        branch_id,
        roles,
        permissions,
    };

    // Add the context to request extensions
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// Function to extract the authorization context from request extensions
pub async fn extract_context<B>(request: &Request<B>) -> Result<AuthorizationContext, AppError> {
    request
        .extensions()
        .get::<AuthorizationContext>()
        .cloned()
        .ok_or_else(|| AppError::Auth("Authorization context not found in request extensions".to_string()))
}
