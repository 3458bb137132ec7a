//! Database seeders for built-in data

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{now_timestamp, AdminRole};

/// Create the initial super admin when no admin account exists yet.
///
/// Returns true when an account was created.
pub async fn ensure_admin_user(pool: &SqlitePool, email: &str, password: &str) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(false);
    }

    let email = email.trim().to_lowercase();
    let password_hash = crate::auth::hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash default admin password: {}", e))?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();

    sqlx::query(
        r#"
        INSERT INTO admin_users (id, email, password_hash, role, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&email)
    .bind(&password_hash)
    .bind(AdminRole::SuperAdmin)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .context("Failed to create default admin user")?;

    info!(admin_id = %id, email = %email, "Created default super admin");
    if password == "admin123" {
        warn!("Default admin password is in use; change it after first login");
    }
    Ok(true)
}
