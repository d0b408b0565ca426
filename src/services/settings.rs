use std::collections::{BTreeMap, HashSet};

use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::events::Activity;
use crate::models::settings::{SettingDefinition, UserSetting};
use crate::services::ensure_account;

/// Carried by some clients alongside the settings map; never a setting.
const RESERVED_KEY: &str = "user_id";

/// Merges `updates` into the account's settings, overwriting existing values.
///
/// Every key is checked against the setting definitions before anything is
/// written, and all writes share one transaction: an unknown key fails the
/// whole call with `Validation` and no value changes.
pub async fn update_settings(
    pool: &SqlitePool,
    activity: &Activity<'_>,
    user_id: i64,
    updates: &BTreeMap<String, String>,
) -> AppResult<Vec<UserSetting>> {
    let mut tx = pool.begin().await?;

    ensure_account(&mut tx, user_id).await?;

    let valid_keys: HashSet<String> = sqlx::query_scalar("SELECT setting_key FROM settings")
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

    let mut pending = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        if key == RESERVED_KEY {
            continue;
        }
        if !valid_keys.contains(key) {
            tracing::warn!(user_id, key = %key, "rejected settings update with unknown key");
            return Err(AppError::validation(format!("invalid setting key: {key}")));
        }
        pending.push((key, value));
    }

    let mut changes = Vec::with_capacity(pending.len());
    for (key, value) in pending {
        let old: Option<String> = sqlx::query_scalar(
            "SELECT setting_value FROM user_settings WHERE user_id = ? AND setting_key = ?",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, setting_key, setting_value)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, setting_key) DO UPDATE SET setting_value = excluded.setting_value
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        let updated = UserSetting {
            user_id,
            setting_key: key.clone(),
            setting_value: value.clone(),
        };
        let old = old.map(|setting_value| UserSetting {
            setting_value,
            ..updated.clone()
        });
        changes.push((updated, old));
    }

    tx.commit().await?;

    tracing::info!(user_id, count = changes.len(), "settings updated");
    for (updated, old) in &changes {
        activity.record_change("updated", updated, old.as_ref());
    }

    Ok(changes.into_iter().map(|(updated, _)| updated).collect())
}

/// All of the account's settings, ordered by key.
pub async fn get_settings(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<UserSetting>> {
    let mut conn = pool.acquire().await?;
    ensure_account(&mut conn, user_id).await?;

    let settings = sqlx::query_as::<_, UserSetting>(
        "SELECT user_id, setting_key, setting_value FROM user_settings WHERE user_id = ? ORDER BY setting_key",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(settings)
}

pub async fn list_setting_definitions(pool: &SqlitePool) -> AppResult<Vec<SettingDefinition>> {
    let definitions = sqlx::query_as::<_, SettingDefinition>(
        "SELECT setting_key, default_value FROM settings ORDER BY setting_key",
    )
    .fetch_all(pool)
    .await?;
    Ok(definitions)
}
