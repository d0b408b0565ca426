use std::path::Path;

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};

use articles_api::config::{HashCost, RbacConfig, RegrantPolicy};
use articles_api::errors::AppError;
use articles_api::events::{Activity, RecordingSink};
use articles_api::services::accounts::{change_password, delete_account, get_account};
use articles_api::services::provisioning::{create_account, NewAccount};
use articles_api::utils::{Argon2Hasher, CredentialHasher};

struct Fixture {
    _dir: TempDir,
    pool: SqlitePool,
    hasher: Argon2Hasher,
    rbac: RbacConfig,
}

async fn setup() -> Result<Fixture> {
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

    Ok(Fixture {
        _dir: dir,
        pool,
        hasher,
        rbac,
    })
}

async fn provision(fixture: &Fixture, username: &str) -> Result<i64> {
    let user = create_account(
        &fixture.pool,
        &fixture.hasher,
        &fixture.rbac,
        &Activity::new(&RecordingSink::new()),
        NewAccount {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "pw123".to_string(),
        },
    )
    .await?;
    Ok(user.id)
}

async fn insert_article(pool: &SqlitePool, author_id: i64, title: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(
        "INSERT INTO articles (author_id, title, content, created_at, updated_at) VALUES (?, ?, 'body', datetime('now'), datetime('now')) RETURNING id",
    )
    .bind(author_id)
    .bind(title)
    .fetch_one(pool)
    .await?)
}

async fn count_where(pool: &SqlitePool, sql: &str, id: i64) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).bind(id).fetch_one(pool).await?)
}

#[tokio::test]
async fn deleting_an_account_removes_its_content_and_grants() -> Result<()> {
    let fixture = setup().await?;
    let pool = &fixture.pool;
    let alice = provision(&fixture, "alice").await?;
    let bob = provision(&fixture, "bob").await?;

    let alice_article = insert_article(pool, alice, "alice writes").await?;
    let bob_article = insert_article(pool, bob, "bob writes").await?;

    for (article_id, user_id) in [(alice_article, bob), (alice_article, alice), (bob_article, alice), (bob_article, bob)] {
        sqlx::query("INSERT INTO article_likes (article_id, user_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(user_id)
            .execute(pool)
            .await?;
    }
    sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, 1)")
        .bind(alice_article)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO article_categories (article_id, category_id) VALUES (?, 1), (?, 1)")
        .bind(alice_article)
        .bind(bob_article)
        .execute(pool)
        .await?;

    let sink = RecordingSink::new();
    delete_account(pool, &Activity::new(&sink), alice).await?;

    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM users WHERE id = ?", alice).await?, 0);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM user_roles WHERE user_id = ?", alice).await?, 0);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM user_settings WHERE user_id = ?", alice).await?, 0);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM articles WHERE author_id = ?", alice).await?, 0);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM article_likes WHERE user_id = ?", alice).await?, 0);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM article_tags WHERE article_id = ?", alice_article).await?, 0);

    // Bob's account, article, like and category link survive.
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM user_roles WHERE user_id = ?", bob).await?, 1);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM article_likes WHERE article_id = ?", bob_article).await?, 1);
    assert_eq!(count_where(pool, "SELECT COUNT(*) FROM article_categories WHERE article_id = ?", bob_article).await?, 1);

    assert_eq!(sink.names(), vec!["user.deleted"]);

    Ok(())
}

#[tokio::test]
async fn deleting_an_unknown_account_is_not_found() -> Result<()> {
    let fixture = setup().await?;
    let sink = RecordingSink::new();

    let err = delete_account(&fixture.pool, &Activity::new(&sink), 42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = get_account(&fixture.pool, 42).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn password_change_requires_current_password() -> Result<()> {
    let fixture = setup().await?;
    let alice = provision(&fixture, "alice").await?;
    let sink = RecordingSink::new();
    let activity = Activity::new(&sink);

    let stored_before: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(alice)
        .fetch_one(&fixture.pool)
        .await?;

    let err = change_password(&fixture.pool, &fixture.hasher, &activity, alice, "wrong".to_string(), "new-pw".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "unexpected error: {err:?}");

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(alice)
        .fetch_one(&fixture.pool)
        .await?;
    assert_eq!(stored, stored_before);

    change_password(&fixture.pool, &fixture.hasher, &activity, alice, "pw123".to_string(), "new-pw".to_string()).await?;

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(alice)
        .fetch_one(&fixture.pool)
        .await?;
    assert!(fixture.hasher.verify("new-pw".to_string(), stored.clone()).await?);
    assert!(!fixture.hasher.verify("pw123".to_string(), stored).await?);
    assert_eq!(sink.names(), vec!["user.password_changed"]);

    let err = change_password(&fixture.pool, &fixture.hasher, &activity, alice, "new-pw".to_string(), String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}
