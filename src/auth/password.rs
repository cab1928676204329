use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::ApiError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const PUNCTUATION: &str = "!@#$%^&*(),.?\":{}|<>";

/// Length, uppercase and punctuation rules applied to every new password.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!("Password must be at least {} characters long.", MIN_PASSWORD_LENGTH));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter.".to_string());
    }

    if !password.chars().any(|c| PUNCTUATION.contains(c)) {
        return Err("Password must contain at least one punctuation mark.".to_string());
    }

    Ok(())
}

/// Argon2id hash in PHC string format with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// Returns false for a wrong password and for an unparsable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

/// Runs `hash_password` off the async executor.
pub async fn hash_password_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))?
}

/// Runs `verify_password` off the async executor.
pub async fn verify_password_blocking(password: String, stored_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength_rules() {
        assert!(validate_password_strength("Testpass123!").is_ok());
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("nouppercase123!").is_err());
        assert!(validate_password_strength("NoPunctuation123").is_err());
        assert!(validate_password_strength("").is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Testpass123!").expect("hashing works");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Testpass123!", &hash));
        assert!(!verify_password("wrongpassword", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("Testpass123!").unwrap();
        let second = hash_password("Testpass123!").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hash = hash_password_blocking("Testpass123!".to_string()).await.unwrap();
        assert!(verify_password_blocking("Testpass123!".to_string(), hash).await.unwrap());
    }
}
