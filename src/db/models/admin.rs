//! Admin console user and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Admin roles. Each role maps to a fixed permission set
/// (see `crate::auth::permissions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Inventory,
    OrderManager,
    Viewer,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::SuperAdmin => "super_admin",
            AdminRole::Inventory => "inventory",
            AdminRole::OrderManager => "order_manager",
            AdminRole::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super_admin" => Ok(AdminRole::SuperAdmin),
            "inventory" => Ok(AdminRole::Inventory),
            "order_manager" => Ok(AdminRole::OrderManager),
            "viewer" => Ok(AdminRole::Viewer),
            _ => Err(format!("Unknown admin role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserResponse {
    pub id: String,
    pub email: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login: Option<String>,
}

impl From<AdminUser> for AdminUserResponse {
    fn from(admin: AdminUser) -> Self {
        Self {
            id: admin.id,
            email: admin.email,
            role: admin.role,
            is_active: admin.is_active,
            last_login: admin.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminSession {
    pub id: String,
    pub admin_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub is_revoked: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub admin: AdminUserResponse,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_products: i64,
    pub total_orders: i64,
    pub total_revenue: super::Money,
    pub pending_orders: i64,
    pub recent_orders: Vec<super::Order>,
}
