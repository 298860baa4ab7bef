//! Password hashing.
//!
//! Argon2id is CPU-intensive, so every hash or verify runs on the blocking
//! pool instead of the async runtime.

use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::Arc;
use tokio::task;

use super::error::QueryError;
use crate::config::SecurityConfig;

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a password against a PHC-format digest. Parameters come from the digest.
pub fn verify_password(password: &str, digest: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(digest)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hashing service shared by every gateway call.
///
/// Holds a digest of a random throwaway password made with the live
/// parameters, so a login for an unknown username can pay the same
/// verification cost as a login with a wrong password.
#[derive(Clone)]
pub struct Credentials {
    config: Arc<SecurityConfig>,
    decoy_digest: Arc<str>,
}

impl Credentials {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let decoy = super::tokens::generate_token();
        let decoy_digest = hash_password(&decoy, config)?;

        Ok(Self {
            config: Arc::new(config.clone()),
            decoy_digest: Arc::from(decoy_digest),
        })
    }

    pub async fn hash(&self, password: &str) -> Result<String, QueryError> {
        let password = password.to_string();
        let config = Arc::clone(&self.config);

        task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| QueryError::Hashing(format!("hashing task panicked: {e}")))?
            .map_err(|e| QueryError::Hashing(e.to_string()))
    }

    /// Verifies `password` against `digest`, or against the decoy when there is
    /// no account. A missing account always yields `false`.
    pub async fn verify(&self, password: &str, digest: Option<&str>) -> Result<bool, QueryError> {
        let known = digest.is_some();
        let digest = digest.map_or_else(|| self.decoy_digest.to_string(), str::to_string);
        let password = password.to_string();

        let matched = task::spawn_blocking(move || verify_password(&password, &digest))
            .await
            .map_err(|e| QueryError::Hashing(format!("verification task panicked: {e}")))?
            .map_err(|e| QueryError::Hashing(e.to_string()))?;

        Ok(known && matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_config() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            min_password_length: 8,
        }
    }

    #[test]
    fn hash_then_verify() {
        let config = cheap_config();
        let digest = hash_password("correct horse", &config).unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &digest).unwrap());
        assert!(!verify_password("battery staple", &digest).unwrap());
    }

    #[test]
    fn rejects_malformed_digest() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn unknown_account_never_verifies() {
        let credentials = Credentials::new(&cheap_config()).unwrap();
        assert!(!credentials.verify("anything", None).await.unwrap());

        let digest = credentials.hash("hunter2hunter2").await.unwrap();
        assert!(credentials.verify("hunter2hunter2", Some(&digest)).await.unwrap());
    }
}
