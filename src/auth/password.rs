use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::error;

/// A freshly generated reset token: the raw form goes to the user, only the
/// digest is ever stored.
#[derive(Debug)]
pub struct ResetToken {
    pub raw: String,
    pub digest: String,
}

/// Credential hashing capability. Injected so the reset flow and the
/// credential store can be exercised with a deterministic implementation.
pub trait Hasher: Send + Sync {
    fn hash_password(&self, plain: &str) -> anyhow::Result<String>;
    fn verify_password(&self, plain: &str, hash: &str) -> anyhow::Result<bool>;
    fn reset_token(&self) -> ResetToken;
    fn digest(&self, raw: &str) -> String;
}

/// Production implementation: argon2 for passwords, sha-256 for the
/// deterministic reset-token digest.
pub struct ArgonHasher;

impl Hasher for ArgonHasher {
    fn hash_password(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify_password(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    fn reset_token(&self) -> ResetToken {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        ResetToken {
            digest: self.digest(&raw),
            raw,
        }
    }

    fn digest(&self, raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}
