use rand::Rng;
use sha2::{Digest, Sha256};

pub const OTP_LENGTH: usize = 6;

/// Six random decimal digits, zero padded.
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// Only the digest of a code is persisted.
pub fn hash_otp(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a submitted code against a stored digest without
/// short-circuiting on the first differing byte.
pub fn otp_matches(code: &str, stored_hash: &str) -> bool {
    let candidate = hash_otp(code);
    if candidate.len() != stored_hash.len() {
        return false;
    }

    candidate
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub fn is_well_formed(code: &str) -> bool {
    let code = code.trim();
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}
