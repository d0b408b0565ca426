use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Role {
    pub id: i64,
    #[schema(example = "editor")]
    pub name: String,
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: i64,
    #[schema(example = "article.create")]
    pub name: String,
}

// =============================================================================
// USER-ROLE GRANT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserRole {
    pub user_id: i64,
    pub role_id: i64,
    pub granted_at: DateTime<Utc>,
}

impl Loggable for UserRole {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> i64 { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

// =============================================================================
// ROLE-PERMISSION GRANT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RolePermission {
    pub role_id: i64,
    pub permission_id: i64,
    pub granted_at: DateTime<Utc>,
}

impl Loggable for RolePermission {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> i64 { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Result of a permission grant under the configured re-grant policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantOutcome {
    Granted,
    AlreadyGranted,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    pub role_id: i64,
    pub permission_id: i64,
    pub outcome: GrantOutcome,
}
