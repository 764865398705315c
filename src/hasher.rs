//! Credential hashing
//!
//! The service only ever stores digests; plaintext passwords exist for
//! the duration of a call. The default hasher is an unsalted SHA-256
//! hex digest: enough for a demo service, not a substitute for a real
//! password KDF.

use sha2::{Digest, Sha256};
use std::fmt::Write;

pub trait CredentialHasher: Send + Sync {
    /// Digest a password for storage.
    fn hash(&self, password: &str) -> String;

    /// Compare a password against a stored digest.
    fn verify(&self, password: &str, digest: &str) -> bool {
        self.hash(password) == digest
    }
}

/// SHA-256 hex digests.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl CredentialHasher for Sha256Hasher {
    fn hash(&self, password: &str) -> String {
        let digest = Sha256::digest(password.as_bytes());
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}
