use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

use crate::config::HashConfig;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("hash error: {0}")]
    Hash(password_hash::Error),
    #[error("stored hash is unreadable: {0}")]
    Parse(password_hash::Error),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Argon2id hasher. Work runs on the blocking pool so a high cost does not
/// stall the async workers.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(cfg: &HashConfig) -> Result<Self, PasswordError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(PasswordError::Params)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub async fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let argon2 = self.argon2.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hash_password(&argon2, &plain)).await?
    }

    /// `Ok(false)` means the password does not match; `Err` means the check
    /// itself could not run.
    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool, PasswordError> {
        let argon2 = self.argon2.clone();
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || verify_password(&argon2, &plain, &hash)).await?
    }
}

fn hash_password(argon2: &Argon2<'_>, plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            PasswordError::Hash(e)
        })?
        .to_string();
    Ok(hash)
}

fn verify_password(argon2: &Argon2<'_>, plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        PasswordError::Parse(e)
    })?;
    match argon2.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "argon2 verify_password error");
            Err(PasswordError::Hash(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(&HashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("params")
    }

    #[tokio::test]
    async fn hash_and_verify_roundtrip() {
        let h = hasher();
        let hash = h.hash("Secur3P@ssw0rd!").await.expect("hashing should succeed");
        assert!(h.verify("Secur3P@ssw0rd!", &hash).await.expect("verify should succeed"));
    }

    #[tokio::test]
    async fn same_password_hashes_differently() {
        let h = hasher();
        let a = h.hash("hunter22").await.unwrap();
        let b = h.hash("hunter22").await.unwrap();
        assert_ne!(a, b);
        assert!(h.verify("hunter22", &a).await.unwrap());
        assert!(h.verify("hunter22", &b).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let h = hasher();
        let hash = h.hash("correct-horse-battery-staple").await.unwrap();
        assert!(!h.verify("wrong-password", &hash).await.expect("verify should not error"));
    }

    #[tokio::test]
    async fn verify_errors_on_malformed_hash() {
        let err = hasher().verify("anything", "not-a-valid-hash").await.unwrap_err();
        assert!(matches!(err, PasswordError::Parse(_)));
    }

    #[tokio::test]
    async fn hashes_from_other_cost_settings_still_verify() {
        let cheap = hasher();
        let dearer = CredentialHasher::new(&HashConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        let hash = cheap.hash("pw").await.unwrap();
        assert!(dearer.verify("pw", &hash).await.unwrap());
    }

    #[test]
    fn rejects_impossible_params() {
        let res = CredentialHasher::new(&HashConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(res, Err(PasswordError::Params(_))));
    }
}
