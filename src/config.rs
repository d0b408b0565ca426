use std::str::FromStr;

use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ROLE_NAME: &str = "reader";

/// What to do when a role is granted a permission it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegrantPolicy {
    /// Duplicate grants are accepted and leave the existing row untouched.
    #[default]
    Ignore,
    /// Duplicate grants fail with a conflict.
    Reject,
}

impl FromStr for RegrantPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "ignore" => Ok(RegrantPolicy::Ignore),
            "reject" => Ok(RegrantPolicy::Reject),
            other => Err(AppError::configuration(format!(
                "PERMISSION_REGRANT must be 'ignore' or 'reject', got '{other}'"
            ))),
        }
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub default_role_name: String,
    pub hash_cost: HashCost,
    pub regrant_policy: RegrantPolicy,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source so parsing can be
    /// tested without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::configuration("DATABASE_URL not set"))?;

        let port = parse_or(&lookup, "APP_PORT", DEFAULT_PORT)?;

        let default_role_name = lookup("DEFAULT_ROLE_NAME")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_NAME.to_string());

        let defaults = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: parse_or(&lookup, "PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&lookup, "PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let regrant_policy = match lookup("PERMISSION_REGRANT") {
            Some(value) => value.parse()?,
            None => RegrantPolicy::default(),
        };

        Ok(Self {
            database_url,
            port,
            default_role_name,
            hash_cost,
            regrant_policy,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> AppResult<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        None => Ok(default),
    }
}

/// RBAC settings the engines need at call time. The protected role's id is
/// looked up once at startup instead of being hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbacConfig {
    pub default_role_id: i64,
    pub regrant_policy: RegrantPolicy,
}

impl RbacConfig {
    pub async fn resolve(pool: &SqlitePool, default_role_name: &str, regrant_policy: RegrantPolicy) -> AppResult<Self> {
        let default_role_id: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(default_role_name)
            .fetch_optional(pool)
            .await?;

        let default_role_id = default_role_id.ok_or_else(|| {
            AppError::configuration(format!("default role '{default_role_name}' does not exist"))
        })?;

        tracing::info!(default_role_id, default_role_name, "resolved protected default role");

        Ok(Self {
            default_role_id,
            regrant_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.default_role_name, DEFAULT_ROLE_NAME);
        assert_eq!(config.hash_cost, HashCost::default());
        assert_eq!(config.regrant_policy, RegrantPolicy::Ignore);
    }

    #[test]
    fn missing_database_url_is_a_configuration_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite://data.db"),
            ("APP_PORT", "9090"),
            ("DEFAULT_ROLE_NAME", "guest"),
            ("PASSWORD_HASH_ITERATIONS", "3"),
            ("PERMISSION_REGRANT", "Reject"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.default_role_name, "guest");
        assert_eq!(config.hash_cost.iterations, 3);
        assert_eq!(config.regrant_policy, RegrantPolicy::Reject);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let bad_port = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "x"), ("APP_PORT", "eighty")]));
        assert!(matches!(bad_port, Err(AppError::Configuration(_))));

        let bad_policy = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "x"), ("PERMISSION_REGRANT", "maybe")]));
        assert!(matches!(bad_policy, Err(AppError::Configuration(_))));
    }
}
