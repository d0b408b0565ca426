use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};

use articles_api::config::{HashCost, RbacConfig, RegrantPolicy};
use articles_api::errors::AppError;
use articles_api::events::{Activity, RecordingSink};
use articles_api::services::provisioning::{create_account, NewAccount};
use articles_api::services::settings::{get_settings, list_setting_definitions, update_settings};
use articles_api::utils::Argon2Hasher;

async fn setup_with_account() -> Result<(TempDir, SqlitePool, i64)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let rbac = RbacConfig::resolve(&pool, "reader", RegrantPolicy::Ignore).await?;
    let hasher = Argon2Hasher::new(HashCost {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })?;
    let user = create_account(
        &pool,
        &hasher,
        &rbac,
        &Activity::new(&RecordingSink::new()),
        NewAccount {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "pw123".to_string(),
        },
    )
    .await?;

    Ok((dir, pool, user.id))
}

fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

async fn settings_map(pool: &SqlitePool, user_id: i64) -> Result<BTreeMap<String, String>> {
    Ok(get_settings(pool, user_id)
        .await?
        .into_iter()
        .map(|setting| (setting.setting_key, setting.setting_value))
        .collect())
}

#[tokio::test]
async fn update_overwrites_only_the_given_keys() -> Result<()> {
    let (_dir, pool, user_id) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let written = update_settings(&pool, &Activity::new(&sink), user_id, &updates(&[("theme", "dark")])).await?;
    assert_eq!(written.len(), 1);

    let settings = settings_map(&pool, user_id).await?;
    assert_eq!(settings["theme"], "dark");
    assert_eq!(settings["language"], "en");
    assert_eq!(settings["email_notifications"], "true");

    let events = sink.events();
    assert_eq!(sink.names(), vec!["user_setting.updated"]);
    assert_eq!(events[0]["payload"]["old"]["setting_value"], "light");
    assert_eq!(events[0]["payload"]["new"]["setting_value"], "dark");

    Ok(())
}

#[tokio::test]
async fn unknown_key_rejects_the_whole_update() -> Result<()> {
    let (_dir, pool, user_id) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let err = update_settings(
        &pool,
        &Activity::new(&sink),
        user_id,
        &updates(&[("theme", "dark"), ("language", "fr"), ("nonexistent", "x")]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "unexpected error: {err:?}");
    assert_eq!(err.to_string(), "validation error: invalid setting key: nonexistent");

    let settings = settings_map(&pool, user_id).await?;
    assert_eq!(settings["theme"], "light");
    assert_eq!(settings["language"], "en");
    assert!(sink.events().is_empty());

    Ok(())
}

#[tokio::test]
async fn user_id_key_is_ignored() -> Result<()> {
    let (_dir, pool, user_id) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let written = update_settings(
        &pool,
        &Activity::new(&sink),
        user_id,
        &updates(&[("user_id", "99"), ("language", "fr")]),
    )
    .await?;

    assert_eq!(written.len(), 1);
    assert_eq!(written[0].setting_key, "language");
    assert_eq!(settings_map(&pool, user_id).await?["language"], "fr");

    Ok(())
}

#[tokio::test]
async fn empty_update_changes_nothing() -> Result<()> {
    let (_dir, pool, user_id) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let written = update_settings(&pool, &Activity::new(&sink), user_id, &BTreeMap::new()).await?;

    assert!(written.is_empty());
    assert_eq!(settings_map(&pool, user_id).await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn unknown_account_is_not_found() -> Result<()> {
    let (_dir, pool, _user_id) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let err = update_settings(&pool, &Activity::new(&sink), 42, &updates(&[("theme", "dark")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = get_settings(&pool, 42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn definitions_list_defaults() -> Result<()> {
    let (_dir, pool, _user_id) = setup_with_account().await?;

    let definitions = list_setting_definitions(&pool).await?;
    let keys: Vec<_> = definitions.iter().map(|d| d.setting_key.as_str()).collect();

    assert_eq!(keys, vec!["email_notifications", "language", "theme"]);

    Ok(())
}
