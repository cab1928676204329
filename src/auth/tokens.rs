use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::ApiError;

const OAUTH_STATE_LIFETIME: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    OauthState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Issues and verifies HS256 JWTs signed with the service secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        TokenService {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            access_lifetime: config.access_token_lifetime,
            refresh_lifetime: config.refresh_token_lifetime,
        }
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access, self.access_lifetime)?,
            refresh_token: self.issue(user_id, TokenType::Refresh, self.refresh_lifetime)?,
            token_type: "Bearer",
            expires_in: self.access_lifetime.as_secs(),
        })
    }

    /// Signed, short-lived value for the OAuth `state` parameter.
    pub fn issue_oauth_state(&self) -> Result<String, ApiError> {
        self.issue(Uuid::nil(), TokenType::OauthState, OAUTH_STATE_LIFETIME)
    }

    fn issue(&self, user_id: Uuid, token_type: TokenType, lifetime: Duration) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            token_type,
        };
        self.encode(&claims)
    }

    pub(crate) fn encode(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Token encoding failed: {}", e)))
    }

    /// Checks signature, expiry and token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if data.claims.token_type != expected {
            return Err(ApiError::unauthorized("Token has the wrong type"));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(&AuthConfig {
            secret_key: secret.to_string(),
            access_token_lifetime: Duration::from_secs(120 * 60),
            refresh_token_lifetime: Duration::from_secs(24 * 60 * 60),
            otp_lifetime: Duration::from_secs(600),
            otp_max_attempts: 5,
        })
    }

    #[test]
    fn test_pair_round_trip() {
        let tokens = service("test-secret");
        let user_id = Uuid::new_v4();
        let pair = tokens.issue_pair(user_id).unwrap();

        let access = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
        let refresh = tokens.verify(&pair.refresh_token, TokenType::Refresh).unwrap();

        assert_eq!(access.sub, user_id);
        assert_eq!(refresh.sub, user_id);
        assert_ne!(access.jti, refresh.jti);
        assert!(refresh.exp > access.exp);
        assert_eq!(pair.expires_in, 120 * 60);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let tokens = service("test-secret");
        let pair = tokens.issue_pair(Uuid::new_v4()).unwrap();

        assert!(matches!(
            tokens.verify(&pair.refresh_token, TokenType::Access),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(tokens.verify(&pair.access_token, TokenType::Refresh).is_err());
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let pair = service("one-secret").issue_pair(Uuid::new_v4()).unwrap();
        assert!(service("another-secret").verify(&pair.access_token, TokenType::Access).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(service("test-secret").verify("invalidtoken", TokenType::Refresh).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let tokens = service("test-secret");
        let now = Utc::now().timestamp();
        let expired = tokens
            .encode(&Claims {
                sub: Uuid::new_v4(),
                jti: Uuid::new_v4(),
                iat: now - 120,
                exp: now - 60,
                token_type: TokenType::Access,
            })
            .unwrap();

        match tokens.verify(&expired, TokenType::Access) {
            Err(ApiError::Unauthorized(message)) => assert_eq!(message, "Token has expired"),
            other => panic!("expected expiry error, got {:?}", other.map(|c| c.jti)),
        }
    }

    #[test]
    fn test_oauth_state() {
        let tokens = service("test-secret");
        let state = tokens.issue_oauth_state().unwrap();
        let claims = tokens.verify(&state, TokenType::OauthState).unwrap();
        assert_eq!(claims.sub, Uuid::nil());
        assert!(tokens.verify(&state, TokenType::Access).is_err());
    }
}
