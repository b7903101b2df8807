//! Capability secrets.
//!
//! A job is owned by whoever holds its secret. Only the base64 SHA-256 digest
//! of the secret is stored.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{JobError, Result};
use crate::state_machine::Job;

const SECRET_BYTES: usize = 50;

/// Generate a fresh secret: 50 random bytes, base64 encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

pub fn hash_secret(secret: &str) -> String {
    STANDARD.encode(Sha256::digest(secret.as_bytes()))
}

/// Check the presented secret against the stored hash.
///
/// The comparison is a plain string compare, not constant time.
pub fn authorize(job: &Job, secret: &str) -> Result<()> {
    if hash_secret(secret) == job.secret_hash {
        Ok(())
    } else {
        Err(JobError::Unauthorized(job.id))
    }
}
