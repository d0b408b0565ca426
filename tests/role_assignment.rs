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
use articles_api::services::roles::{assign_role, list_user_roles, revoke_role};
use articles_api::utils::Argon2Hasher;

async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

/// Pool with one provisioned account ("alice", id 1) and an extra role 7.
async fn setup_with_account() -> Result<(TempDir, SqlitePool, RbacConfig)> {
    let (dir, pool) = setup_pool().await?;
    let rbac = RbacConfig::resolve(&pool, "reader", RegrantPolicy::Ignore).await?;
    let hasher = Argon2Hasher::new(HashCost {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })?;

    create_account(
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

    sqlx::query("INSERT INTO roles (id, name) VALUES (7, 'moderator')")
        .execute(&pool)
        .await?;

    Ok((dir, pool, rbac))
}

async fn roles_of(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
    Ok(sqlx::query_scalar("SELECT role_id FROM user_roles WHERE user_id = ? ORDER BY role_id")
        .bind(user_id)
        .fetch_all(pool)
        .await?)
}

#[tokio::test]
async fn assigning_a_role_replaces_the_default() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let grant = assign_role(&pool, &rbac, &Activity::new(&sink), 1, 7).await?;

    assert_eq!(grant.user_id, 1);
    assert_eq!(grant.role_id, 7);
    assert_eq!(roles_of(&pool, 1).await?, vec![7]);
    assert_eq!(sink.names(), vec!["user_role.revoked", "user_role.assigned"]);

    let listed = list_user_roles(&pool, 1).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].role_id, 7);

    Ok(())
}

#[tokio::test]
async fn reassignment_never_leaves_two_roles() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();
    let activity = Activity::new(&sink);

    for role_id in [2, 1, 7, 3, 2] {
        assign_role(&pool, &rbac, &activity, 1, role_id).await?;
        assert_eq!(roles_of(&pool, 1).await?, vec![role_id]);
    }

    Ok(())
}

#[tokio::test]
async fn unknown_role_keeps_previous_grant() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let err = assign_role(&pool, &rbac, &Activity::new(&sink), 1, 999).await.unwrap_err();

    assert!(matches!(err, AppError::Storage(_)), "unexpected error: {err:?}");
    assert_eq!(roles_of(&pool, 1).await?, vec![rbac.default_role_id]);
    assert!(sink.events().is_empty());

    Ok(())
}

#[tokio::test]
async fn unknown_account_is_not_found() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let err = assign_role(&pool, &rbac, &Activity::new(&sink), 42, 7).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "unexpected error: {err:?}");

    let err = list_user_roles(&pool, 42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn default_role_cannot_be_revoked() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();

    let err = revoke_role(&pool, &rbac, &Activity::new(&sink), 1, rbac.default_role_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)), "unexpected error: {err:?}");
    assert_eq!(roles_of(&pool, 1).await?, vec![rbac.default_role_id]);
    assert!(sink.events().is_empty());

    Ok(())
}

#[tokio::test]
async fn revoking_a_non_default_role_removes_only_that_grant() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();
    let activity = Activity::new(&sink);

    assign_role(&pool, &rbac, &activity, 1, 7).await?;

    assert!(revoke_role(&pool, &rbac, &activity, 1, 7).await?);
    assert!(roles_of(&pool, 1).await?.is_empty());

    // Not held any more: still not an error.
    assert!(!revoke_role(&pool, &rbac, &activity, 1, 7).await?);

    assert_eq!(
        sink.names(),
        vec!["user_role.revoked", "user_role.assigned", "user_role.revoked"]
    );

    Ok(())
}

#[tokio::test]
async fn concurrent_assignments_leave_exactly_one_role() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();
    let activity = Activity::new(&sink);

    let (first, second) = tokio::join!(
        assign_role(&pool, &rbac, &activity, 1, 1),
        assign_role(&pool, &rbac, &activity, 1, 2),
    );

    // A writer may lose the lock race; it must then change nothing.
    assert!(first.is_ok() || second.is_ok());

    let roles = roles_of(&pool, 1).await?;
    assert_eq!(roles.len(), 1);
    assert!(roles[0] == 1 || roles[0] == 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn revoked_role_is_gone_for_the_next_read() -> Result<()> {
    let (_dir, pool, rbac) = setup_with_account().await?;
    let sink = RecordingSink::new();
    let activity = Activity::new(&sink);

    for round in 0..50 {
        assign_role(&pool, &rbac, &activity, 1, 7).await?;
        assert!(revoke_role(&pool, &rbac, &activity, 1, 7).await?);

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE user_id = 1 AND role_id = 7")
                .fetch_one(&pool)
                .await?;
        assert_eq!(remaining, 0, "grant still visible after revoke in round {round}");
    }

    Ok(())
}
