//! Google OAuth2 authorization-code flow.
//!
//! The browser is sent to Google's consent page, Google redirects back to the
//! callback with a `code`, and the backend exchanges that code for an access
//! token and then for the user's profile.

use serde::Deserialize;
use tracing::{error, info};

use crate::config::GoogleConfig;
use crate::error::ApiError;
use crate::models::user::{is_valid_email, normalize_email};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Subset of the userinfo payload the service uses.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub email: Option<String>,
    pub verified_email: Option<bool>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleUserInfo {
    /// Normalized email, only when Google has verified it. Accounts are
    /// matched on this address, so an unverified one is never accepted.
    pub fn verified_email_address(&self) -> Result<String, ApiError> {
        if self.verified_email == Some(false) {
            return Err(ApiError::validation("Google account email is not verified"));
        }

        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|email| is_valid_email(email))
            .ok_or_else(|| ApiError::validation("Failed to retrieve user info"))
    }
}

#[derive(Clone)]
pub struct GoogleOAuth {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleConfig, http: reqwest::Client) -> Self {
        GoogleOAuth { config, http }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&access_type=online&prompt=select_account",
            AUTH_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    /// Trades an authorization code for a Google access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, ApiError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Google token request failed: {}", e);
                ApiError::upstream(format!("Google token request failed: {}", e))
            })?;

        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| {
            error!("Google token response could not be parsed: {}", e);
            ApiError::validation("Failed to obtain access token")
        })?;

        match body.access_token {
            Some(token) if status.is_success() => {
                info!("Exchanged Google authorization code for access token");
                Ok(token)
            }
            _ => {
                error!(
                    "Failed to exchange code for token: status={} error={:?} description={:?}",
                    status, body.error, body.error_description
                );
                Err(ApiError::validation("Failed to obtain access token"))
            }
        }
    }

    pub async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, ApiError> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                error!("Google userinfo request failed: {}", e);
                ApiError::upstream(format!("Google userinfo request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Failed to exchange token for user info: {} {}", status, text);
            return Err(ApiError::validation("Failed to retrieve user info"));
        }

        response.json::<GoogleUserInfo>().await.map_err(|e| {
            error!("Google userinfo response could not be parsed: {}", e);
            ApiError::validation("Failed to retrieve user info")
        })
    }
}
