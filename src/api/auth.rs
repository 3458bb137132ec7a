use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use crate::auth::{verify_password, verify_unknown_account, Permission};
use crate::db::{
    format_timestamp, now_timestamp, AdminRole, AdminUser, AdminUserResponse, LoginRequest,
    LoginResponse,
};
use crate::AppState;

/// Authenticated admin, inserted into request extensions by `auth_middleware`
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin_id: String,
    pub email: String,
    pub role: AdminRole,
    pub token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminContext>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.email.trim().is_empty() {
        errors.add("email", "Email is required");
    }
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let email = request.email.trim().to_lowercase();
    let admin: Option<AdminUser> = sqlx::query_as("SELECT * FROM admin_users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let verified = match admin {
        Some(admin) => verify_password(&request.password, &admin.password_hash).then_some(admin),
        None => {
            verify_unknown_account(&request.password);
            None
        }
    };
    let Some(mut admin) = verified else {
        warn!(email = %email, "Failed admin login");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    if !admin.is_active {
        warn!(admin_id = %admin.id, "Login attempt on deactivated admin account");
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    let issued = state.tokens.issue(&admin)?;
    state.tokens.record_session(&admin.id, &issued).await?;

    let now = now_timestamp();
    sqlx::query("UPDATE admin_users SET last_login = ?, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(&admin.id)
        .execute(&state.db)
        .await?;
    admin.last_login = Some(now);

    info!(admin_id = %admin.id, role = %admin.role, "Admin logged in");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: format_timestamp(issued.expires_at),
        admin: admin.into(),
    }))
}

/// Revoke the session of the calling token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
) -> Result<Json<Value>, ApiError> {
    state.tokens.revoke(&admin.token).await?;
    info!(admin_id = %admin.admin_id, "Admin logged out");
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
) -> Result<Json<AdminUserResponse>, ApiError> {
    let user: AdminUser = sqlx::query_as("SELECT * FROM admin_users WHERE id = ?")
        .bind(&admin.admin_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin not found"))?;
    Ok(Json(user.into()))
}

/// Validates the bearer token, rejects revoked sessions and loads the admin.
///
/// Authorization uses the role and active flag stored now, not the ones
/// captured in the token.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authorization token required"))?;

    let claims = state.tokens.validate(&token)?;
    if state.tokens.is_revoked(&token).await {
        return Err(ApiError::unauthorized("Token has been revoked"));
    }

    let admin: Option<AdminUser> = sqlx::query_as("SELECT * FROM admin_users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;
    let admin = match admin {
        Some(admin) if admin.is_active => admin,
        _ => {
            warn!(admin_id = %claims.sub, "Token presented for missing or deactivated admin");
            return Err(ApiError::unauthorized("Admin account is not active"));
        }
    };

    request.extensions_mut().insert(AdminContext {
        admin_id: admin.id,
        email: admin.email,
        role: admin.role,
        token,
    });

    Ok(next.run(request).await)
}

/// Route guard: the authenticated admin's role must grant `permission`.
pub async fn require_permission(
    State(permission): State<Permission>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let admin = request
        .extensions()
        .get::<AdminContext>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !admin.role.can(permission) {
        warn!(
            admin_id = %admin.admin_id,
            role = %admin.role,
            permission = %permission,
            "Permission denied"
        );
        return Err(ApiError::forbidden(format!(
            "Insufficient permissions: {} required",
            permission
        )));
    }

    Ok(next.run(request).await)
}
