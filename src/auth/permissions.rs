//! Role to permission mapping for the admin console.

use serde::Serialize;

use crate::db::AdminRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewProducts,
    CreateProducts,
    UpdateProducts,
    DeleteProducts,
    ViewOrders,
    UpdateOrders,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ViewProducts,
        Permission::CreateProducts,
        Permission::UpdateProducts,
        Permission::DeleteProducts,
        Permission::ViewOrders,
        Permission::UpdateOrders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewProducts => "view_products",
            Permission::CreateProducts => "create_products",
            Permission::UpdateProducts => "update_products",
            Permission::DeleteProducts => "delete_products",
            Permission::ViewOrders => "view_orders",
            Permission::UpdateOrders => "update_orders",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const INVENTORY: &[Permission] = &[
    Permission::ViewProducts,
    Permission::CreateProducts,
    Permission::UpdateProducts,
    Permission::DeleteProducts,
];

const ORDER_MANAGER: &[Permission] = &[Permission::ViewOrders, Permission::UpdateOrders];

const VIEWER: &[Permission] = &[Permission::ViewProducts, Permission::ViewOrders];

impl AdminRole {
    /// Permissions granted to this role
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            AdminRole::SuperAdmin => &Permission::ALL,
            AdminRole::Inventory => INVENTORY,
            AdminRole::OrderManager => ORDER_MANAGER,
            AdminRole::Viewer => VIEWER,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}
