//! Transactional core: account provisioning, role assignment, the
//! role/permission grant ledger and settings merge.
//!
//! Every multi-statement operation runs inside one `sqlx::Transaction` that
//! is committed as its last step. An early return through `?` drops the
//! transaction, which rolls it back; so does a cancelled request future.
//! Activity events are emitted only after a successful commit.

use sqlx::SqliteConnection;

use crate::errors::{AppError, AppResult};

pub mod accounts;
pub mod permissions;
pub mod provisioning;
pub mod roles;
pub mod settings;

/// Fails with `NotFound` unless the account row exists.
pub(crate) async fn ensure_account(conn: &mut SqliteConnection, user_id: i64) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    if !exists {
        return Err(AppError::not_found(format!("user {user_id} not found")));
    }

    Ok(())
}
