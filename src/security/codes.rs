//! Access code and token generation.
//!
//! Codes are short, human-readable and typed by patients. Tokens are long
//! and only ever travel inside URLs. Both are hashed with SHA-256 before they
//! are sent anywhere that persists them.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Alphabet for access codes.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of codes issued to patients.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Random bytes per token (hex-encoded to twice this length).
const TOKEN_BYTES: usize = 32;

/// Generate a code of `length` characters drawn uniformly from `[A-Z0-9]`.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Generate an unguessable 64-character hex token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of an access code, lowercase hex.
pub fn hash_code(code: &str) -> String {
    sha256_hex(code)
}

/// SHA-256 digest of a share or object token, lowercase hex.
pub fn hash_token(token: &str) -> String {
    sha256_hex(token)
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
