use sqlx::{SqliteConnection, SqlitePool};

use crate::config::RbacConfig;
use crate::errors::{AppError, AppResult};
use crate::events::Activity;
use crate::models::user::User;
use crate::services::roles;
use crate::utils::{utc_now, CredentialHasher};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Creates an account together with its default role grant and its default
/// settings. Either all three are committed or none is.
///
/// The password is hashed before the transaction opens so no connection is
/// held during the deliberately slow hash; a hashing failure therefore
/// commits nothing either.
pub async fn create_account(
    pool: &SqlitePool,
    hasher: &dyn CredentialHasher,
    rbac: &RbacConfig,
    activity: &Activity<'_>,
    account: NewAccount,
) -> AppResult<User> {
    let NewAccount {
        username,
        email,
        password,
    } = account;

    if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        tracing::warn!("account creation rejected: empty input");
        return Err(AppError::validation("username, email and password must not be empty"));
    }

    tracing::info!(%username, %email, "creating account");

    let password_hash = hasher.hash(password).await?;
    let now = utc_now();

    let mut tx = pool.begin().await?;

    let user_id = sqlx::query(
        "INSERT INTO users (username, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|err| match AppError::from(err) {
        AppError::Conflict(_) => AppError::conflict("username or email already in use"),
        other => other,
    })?
    .last_insert_rowid();

    let grant = roles::upsert_grant(&mut tx, user_id, rbac.default_role_id, now).await?;
    let seeded = seed_default_settings(&mut tx, user_id).await?;

    tx.commit().await?;

    let user = User {
        id: user_id,
        username,
        email,
        created_at: now,
        updated_at: now,
    };

    tracing::info!(user_id, role_id = grant.role_id, settings = seeded, "account created");
    activity.record("created", &user);
    activity.record("assigned", &grant);

    Ok(user)
}

/// Copies every setting definition's default onto the account. Existing
/// rows are left alone, so running this again never duplicates a key or
/// overwrites a value the user already changed. Returns the rows inserted.
pub async fn seed_default_settings(conn: &mut SqliteConnection, user_id: i64) -> AppResult<u64> {
    // SQLite needs the WHERE clause to parse INSERT ... SELECT ... ON CONFLICT.
    let result = sqlx::query(
        r#"
        INSERT INTO user_settings (user_id, setting_key, setting_value)
        SELECT ?, s.setting_key, s.default_value
        FROM settings s
        WHERE true
        ON CONFLICT (user_id, setting_key) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
