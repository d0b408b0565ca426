use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand_core::OsRng;

use crate::config::HashCost;
use crate::errors::{AppError, AppResult};

/// One-way password hashing. Implementations take the plaintext by value so
/// it is dropped as soon as the digest exists.
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash(&self, plaintext: String) -> AppResult<String>;

    async fn verify(&self, plaintext: String, digest: String) -> AppResult<bool>;
}

/// Argon2id hasher. Hashing runs on the blocking pool; its cost is the point,
/// so it is never skipped or cached.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(cost: HashCost) -> AppResult<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|err| AppError::configuration(format!("invalid password hash cost: {err}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, plaintext: String) -> AppResult<String> {
        let argon2 = self.argon2();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| AppError::hashing(format!("failed to hash password: {err}")))
        })
        .await
        .map_err(|err| AppError::hashing(format!("hashing task failed: {err}")))?
    }

    async fn verify(&self, plaintext: String, digest: String) -> AppResult<bool> {
        let argon2 = self.argon2();

        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&digest)
                .map_err(|err| AppError::hashing(format!("invalid password hash: {err}")))?;

            Ok(argon2.verify_password(plaintext.as_bytes(), &parsed_hash).is_ok())
        })
        .await
        .map_err(|err| AppError::hashing(format!("verification task failed: {err}")))?
    }
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
