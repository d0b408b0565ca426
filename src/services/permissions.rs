use sqlx::SqlitePool;

use crate::config::RegrantPolicy;
use crate::errors::{AppError, AppResult};
use crate::events::Activity;
use crate::models::rbac::{GrantOutcome, Permission, RolePermission};
use crate::utils::utc_now;

/// Adds a permission to a role.
///
/// Granting a pair that already exists is governed by `policy`: `Ignore`
/// keeps the existing row and reports [`GrantOutcome::AlreadyGranted`],
/// `Reject` fails with `Conflict`. Unknown role or permission ids surface as
/// storage errors from the foreign keys.
pub async fn grant_permission(
    pool: &SqlitePool,
    policy: RegrantPolicy,
    activity: &Activity<'_>,
    role_id: i64,
    permission_id: i64,
) -> AppResult<GrantOutcome> {
    let sql = match policy {
        RegrantPolicy::Ignore => {
            "INSERT INTO role_permissions (role_id, permission_id, granted_at) VALUES (?, ?, ?) ON CONFLICT (role_id, permission_id) DO NOTHING"
        }
        RegrantPolicy::Reject => {
            "INSERT INTO role_permissions (role_id, permission_id, granted_at) VALUES (?, ?, ?)"
        }
    };

    let now = utc_now();
    let result = sqlx::query(sql)
        .bind(role_id)
        .bind(permission_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|err| match AppError::from(err) {
            AppError::Conflict(_) => AppError::conflict(format!(
                "role {role_id} already holds permission {permission_id}"
            )),
            other => other,
        })?;

    if result.rows_affected() == 0 {
        tracing::debug!(role_id, permission_id, "permission already granted");
        return Ok(GrantOutcome::AlreadyGranted);
    }

    tracing::info!(role_id, permission_id, "permission granted");
    activity.record(
        "granted",
        &RolePermission {
            role_id,
            permission_id,
            granted_at: now,
        },
    );

    Ok(GrantOutcome::Granted)
}

/// Removes a permission from a role; `NotFound` when the pair was never
/// granted.
pub async fn revoke_permission(
    pool: &SqlitePool,
    activity: &Activity<'_>,
    role_id: i64,
    permission_id: i64,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let removed: Vec<RolePermission> = sqlx::query_as(
        "DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ? RETURNING role_id, permission_id, granted_at",
    )
    .bind(role_id)
    .bind(permission_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    let Some(grant) = removed.into_iter().next() else {
        return Err(AppError::not_found(format!(
            "permission {permission_id} is not granted to role {role_id}"
        )));
    };

    tracing::info!(role_id, permission_id, "permission revoked");
    activity.record("revoked", &grant);

    Ok(())
}

pub async fn list_permissions(pool: &SqlitePool) -> AppResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>("SELECT id, name FROM permissions ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(permissions)
}

/// Permissions held by a role, ordered by id. An unknown role is `NotFound`.
pub async fn list_role_permissions(pool: &SqlitePool, role_id: i64) -> AppResult<Vec<Permission>> {
    let role_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM roles WHERE id = ?)")
        .bind(role_id)
        .fetch_one(pool)
        .await?;

    if !role_exists {
        return Err(AppError::not_found(format!("role {role_id} not found")));
    }

    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        WHERE rp.role_id = ?
        ORDER BY p.id
        "#,
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;

    Ok(permissions)
}
