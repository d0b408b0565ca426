use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::events::Activity;
use crate::models::user::{DbUser, User};
use crate::utils::{utc_now, CredentialHasher};

pub async fn get_account(pool: &SqlitePool, user_id: i64) -> AppResult<User> {
    let user = fetch_db_user(pool, user_id).await?;
    Ok(user.into())
}

/// Deletes an account and everything that depends on it in one transaction.
///
/// Likes and article links are removed before the articles, and the
/// articles before the account row. Role grants and settings go with the
/// account through `ON DELETE CASCADE`.
pub async fn delete_account(pool: &SqlitePool, activity: &Activity<'_>, user_id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let user: Option<DbUser> = sqlx::query_as(
        "SELECT id, username, email, password_hash, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(user) = user else {
        return Err(AppError::not_found(format!("user {user_id} not found")));
    };

    sqlx::query(
        "DELETE FROM article_likes WHERE user_id = ? OR article_id IN (SELECT id FROM articles WHERE author_id = ?)",
    )
    .bind(user_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM article_tags WHERE article_id IN (SELECT id FROM articles WHERE author_id = ?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM article_categories WHERE article_id IN (SELECT id FROM articles WHERE author_id = ?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let articles = sqlx::query("DELETE FROM articles WHERE author_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id, articles, "account deleted");
    activity.record("deleted", &User::from(user));

    Ok(())
}

/// Replaces the account's password after checking the current one.
///
/// The update is conditional on the stored hash still being the one that was
/// verified, so two concurrent changes cannot both succeed.
pub async fn change_password(
    pool: &SqlitePool,
    hasher: &dyn CredentialHasher,
    activity: &Activity<'_>,
    user_id: i64,
    current_password: String,
    new_password: String,
) -> AppResult<()> {
    if current_password.is_empty() || new_password.is_empty() {
        return Err(AppError::validation("current and new password must not be empty"));
    }

    let user = fetch_db_user(pool, user_id).await?;

    if !hasher.verify(current_password, user.password_hash.clone()).await? {
        tracing::warn!(user_id, "password change rejected: current password mismatch");
        return Err(AppError::forbidden("current password is incorrect"));
    }

    let new_hash = hasher.hash(new_password).await?;
    let now = utc_now();

    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = ?")
        .bind(&new_hash)
        .bind(now)
        .bind(user_id)
        .bind(&user.password_hash)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("password was changed concurrently"));
    }

    tracing::info!(user_id, "password changed");
    let mut updated = User::from(user);
    updated.updated_at = now;
    activity.record("password_changed", &updated);

    Ok(())
}

async fn fetch_db_user(pool: &SqlitePool, user_id: i64) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))
}
