use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const MAX_NAME_LENGTH: usize = 50;
pub const DEFAULT_NAME: &str = "Unknown";

/// A registered account.
///
/// `password_hash` is `None` for accounts created through Google sign-in that
/// never set a password; it is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub is_oauth: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values needed to insert a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub is_oauth: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Signout carries the refresh token to revoke.
pub type SignoutRequest = RefreshRequest;

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// Account fields collected from the multipart `update_account` form.
#[derive(Debug, Default)]
pub struct UpdateAccount {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Stored path of an already validated and written picture.
    pub profile_picture: Option<String>,
}

/// A password reset code awaiting verification. Only the hash is stored.
#[derive(Debug, Clone)]
pub struct PasswordResetOtp {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetOtp {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn attempts_exhausted(&self, max_attempts: i32) -> bool {
        self.attempts >= max_attempts
    }
}

impl SignupRequest {
    /// Field rules for signup. The password strength rules live in
    /// `auth::password` and are checked here as well.
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email cannot be empty".to_string());
        }

        if !is_valid_email(self.email.trim()) {
            return Err("Invalid email format".to_string());
        }

        if self.email.len() > 255 {
            return Err("Email cannot exceed 255 characters".to_string());
        }

        crate::auth::password::validate_password_strength(&self.password)?;

        if let Some(ref first_name) = self.first_name {
            validate_name("First name", first_name)?;
        }

        if let Some(ref last_name) = self.last_name {
            validate_name("Last name", last_name)?;
        }

        Ok(())
    }

    /// Trims names (defaulting to `Unknown`) and lowercases the email.
    pub fn into_new_user(self, password_hash: String) -> NewUser {
        NewUser {
            email: normalize_email(&self.email),
            password_hash: Some(password_hash),
            first_name: normalize_name(self.first_name),
            last_name: normalize_name(self.last_name),
            profile_picture: None,
            is_oauth: false,
        }
    }
}

impl SigninRequest {
    /// Returns `(email, password)` when both are present and non-blank.
    pub fn credentials(&self) -> Option<(String, &str)> {
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((normalize_email(email), password))
    }
}

impl UpdateAccount {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.profile_picture.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err(
                "At least one field (first_name, last_name or profile_picture) must be provided for update"
                    .to_string(),
            );
        }

        if let Some(ref first_name) = self.first_name {
            validate_name("First name", first_name)?;
        }

        if let Some(ref last_name) = self.last_name {
            validate_name("Last name", last_name)?;
        }

        Ok(())
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} cannot be empty", field));
    }

    if value.trim().chars().count() > MAX_NAME_LENGTH {
        return Err(format!("{} cannot exceed {} characters", field, MAX_NAME_LENGTH));
    }

    Ok(())
}

fn normalize_name(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

/// Emails are case-insensitive for lookup, so they are stored lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic structural email check without regular expressions.
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();

    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || local.len() > 64 {
        return false;
    }

    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    let valid_chars = |c: char| c.is_alphanumeric() || ".-_+".contains(c);

    local.chars().all(valid_chars) && domain.chars().all(|c| c.is_alphanumeric() || ".-".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            first_name: Some("Test".to_string()),
            last_name: Some("User".to_string()),
        }
    }

    #[test]
    fn test_signup_validation() {
        assert!(signup("testuser@example.com", "Testpass123!").validate().is_ok());
        assert!(signup("invalid-email", "Testpass123!").validate().is_err());
        assert!(signup("", "Testpass123!").validate().is_err());
        assert!(signup("testuser@example.com", "weak").validate().is_err());

        let mut long_name = signup("testuser@example.com", "Testpass123!");
        long_name.first_name = Some("a".repeat(51));
        assert!(long_name.validate().is_err());

        let mut blank_name = signup("testuser@example.com", "Testpass123!");
        blank_name.last_name = Some("   ".to_string());
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_signup_normalization() {
        let mut request = signup("  TestUser@Example.COM ", "Testpass123!");
        request.first_name = Some("  Test ".to_string());
        request.last_name = None;

        let new_user = request.into_new_user("hash".to_string());
        assert_eq!(new_user.email, "testuser@example.com");
        assert_eq!(new_user.first_name, "Test");
        assert_eq!(new_user.last_name, DEFAULT_NAME);
        assert_eq!(new_user.password_hash.as_deref(), Some("hash"));
        assert!(!new_user.is_oauth);
    }

    #[test]
    fn test_signin_credentials() {
        let complete = SigninRequest {
            email: Some(" User@Example.com".to_string()),
            password: Some("secret".to_string()),
        };
        assert_eq!(
            complete.credentials(),
            Some(("user@example.com".to_string(), "secret"))
        );

        let missing_password = SigninRequest { email: Some("user@example.com".to_string()), password: None };
        assert!(missing_password.credentials().is_none());

        let blank_email = SigninRequest { email: Some("  ".to_string()), password: Some("x".to_string()) };
        assert!(blank_email.credentials().is_none());
    }

    #[test]
    fn test_update_account_validation() {
        assert!(UpdateAccount::default().validate().is_err());

        let rename = UpdateAccount { first_name: Some("Jane".to_string()), ..Default::default() };
        assert!(rename.validate().is_ok());

        let blank = UpdateAccount { last_name: Some("".to_string()), ..Default::default() };
        assert!(blank.validate().is_err());

        let picture_only = UpdateAccount {
            profile_picture: Some("profile_pics/a.png".to_string()),
            ..Default::default()
        };
        assert!(picture_only.validate().is_ok());
    }

    #[test]
    fn test_otp_expiry_and_attempts() {
        let now = Utc::now();
        let otp = PasswordResetOtp {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code_hash: "0".repeat(64),
            expires_at: now + chrono::Duration::minutes(10),
            attempts: 4,
            consumed_at: None,
            created_at: now,
        };

        assert!(!otp.is_expired(now));
        assert!(otp.is_expired(now + chrono::Duration::minutes(10)));
        assert!(!otp.attempts_exhausted(5));
        assert!(PasswordResetOtp { attempts: 5, ..otp }.attempts_exhausted(5));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("user.name@domain.co.uk"));
        assert!(is_valid_email("user+tag@example.org"));

        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@domain"));
        assert!(!is_valid_email("user@.domain"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_user_serialization_hides_password() {
        let user = User {
            id: Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap(),
            email: "john@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            profile_picture: None,
            is_oauth: false,
            is_active: true,
            is_staff: false,
            created_at: DateTime::parse_from_rfc3339("2022-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339("2022-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
        };

        let json = serde_json::to_value(&user).expect("Failed to serialize user");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "john@example.com");
        assert_eq!(json["first_name"], "John");
    }
}
