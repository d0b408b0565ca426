use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::RbacConfig;
use crate::errors::{AppError, AppResult};
use crate::events::Activity;
use crate::models::rbac::{Role, UserRole};
use crate::services::ensure_account;
use crate::utils::utc_now;

/// Moves the account onto `role_id`.
///
/// Revoke-then-grant runs in one transaction: the default-role grant is
/// deleted if present, then the new grant is written keyed by account, which
/// replaces any other role still held. No reader ever sees the account with
/// zero or two roles, and a failure (unknown role, unknown account) leaves
/// the previous grant in place.
pub async fn assign_role(
    pool: &SqlitePool,
    rbac: &RbacConfig,
    activity: &Activity<'_>,
    user_id: i64,
    role_id: i64,
) -> AppResult<UserRole> {
    let now = utc_now();
    let mut tx = pool.begin().await?;

    ensure_account(&mut tx, user_id).await?;

    let previous = current_grant(&mut tx, user_id).await?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id)
        .bind(rbac.default_role_id)
        .execute(&mut *tx)
        .await?;

    let grant = upsert_grant(&mut tx, user_id, role_id, now).await?;

    tx.commit().await?;

    tracing::info!(
        user_id,
        role_id,
        previous_role_id = previous.as_ref().map(|p| p.role_id),
        "role assigned"
    );

    if let Some(previous) = previous.filter(|p| p.role_id != role_id) {
        activity.record("revoked", &previous);
    }
    activity.record("assigned", &grant);

    Ok(grant)
}

/// Removes `role_id` from the account. The protected default role is refused
/// before storage is touched. Returns whether a grant was actually removed;
/// revoking a role the account does not hold is not an error.
pub async fn revoke_role(
    pool: &SqlitePool,
    rbac: &RbacConfig,
    activity: &Activity<'_>,
    user_id: i64,
    role_id: i64,
) -> AppResult<bool> {
    if role_id == rbac.default_role_id {
        tracing::warn!(user_id, role_id, "attempt to revoke the protected default role");
        return Err(AppError::forbidden(format!(
            "role {role_id} is the default role and cannot be revoked"
        )));
    }

    // fetch_all steps the DELETE to completion; a half-read RETURNING
    // statement keeps its write open on the pooled connection.
    let mut tx = pool.begin().await?;
    let removed: Vec<UserRole> = sqlx::query_as(
        "DELETE FROM user_roles WHERE user_id = ? AND role_id = ? RETURNING user_id, role_id, granted_at",
    )
    .bind(user_id)
    .bind(role_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    match removed.into_iter().next() {
        Some(grant) => {
            tracing::info!(user_id, role_id, "role revoked");
            activity.record("revoked", &grant);
            Ok(true)
        }
        None => {
            tracing::debug!(user_id, role_id, "no matching role grant to revoke");
            Ok(false)
        }
    }
}

pub async fn list_roles(pool: &SqlitePool) -> AppResult<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(roles)
}

/// The account's role grants; at most one by construction.
pub async fn list_user_roles(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<UserRole>> {
    let mut conn = pool.acquire().await?;
    ensure_account(&mut conn, user_id).await?;

    let grants = sqlx::query_as::<_, UserRole>(
        "SELECT user_id, role_id, granted_at FROM user_roles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(grants)
}

async fn current_grant(conn: &mut SqliteConnection, user_id: i64) -> AppResult<Option<UserRole>> {
    let grant = sqlx::query_as::<_, UserRole>(
        "SELECT user_id, role_id, granted_at FROM user_roles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(grant)
}

/// Writes the account's single grant, replacing whatever it held.
pub(crate) async fn upsert_grant(
    conn: &mut SqliteConnection,
    user_id: i64,
    role_id: i64,
    now: DateTime<Utc>,
) -> AppResult<UserRole> {
    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id, granted_at)
        VALUES (?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE
        SET role_id = excluded.role_id, granted_at = excluded.granted_at
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(UserRole {
        user_id,
        role_id,
        granted_at: now,
    })
}
