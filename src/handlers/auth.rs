// Authentication handlers: signup, signin, tokens, Google sign-in and
// password management.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{message, ApiJson};
use crate::{
    auth::{otp, password, AuthUser, TokenPair, TokenType},
    error::ApiError,
    jobs::{signals, Job},
    mail::templates,
    models::{
        user::{
            is_valid_email, normalize_email, ChangePasswordRequest, PasswordResetRequest, RefreshRequest,
            SignoutRequest, VerifyOtpRequest, DEFAULT_NAME, MAX_NAME_LENGTH,
        },
        NewUser, SigninRequest, SignupRequest, User,
    },
    state::AppState,
};

const INVALID_CODE: &str = "Invalid or expired code.";
const TOO_MANY_ATTEMPTS: &str = "Too many failed attempts. Please request a new code.";

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Register a new account
/// POST /api/auth/signup/
pub async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate().map_err(ApiError::Validation)?;

    let email = normalize_email(&request.email);
    info!("Signing up user with email: {}", email);

    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::validation("User already exists."));
    }

    let password_hash = password::hash_password_blocking(request.password.clone()).await?;

    let user = state
        .db
        .create_user(request.into_new_user(password_hash))
        .await
        .map_err(|e| match e {
            // lost a race with a concurrent signup for the same email
            ApiError::Conflict(_) => ApiError::validation("User already exists."),
            other => other,
        })?;

    signals::user_created(&state, &user).await;

    let tokens = state.tokens.issue_pair(user.id)?;
    info!("Successfully created user with id: {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse { message: "User created successfully.", user, tokens }),
    ))
}

/// Email and password sign-in
/// POST /api/signin/
pub async fn signin(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SigninRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (email, password) = request
        .credentials()
        .ok_or_else(|| ApiError::validation("Email and password are required."))?;

    let invalid = || ApiError::validation("Invalid credentials.");

    let user = state.db.find_user_by_email(&email).await?.ok_or_else(invalid)?;
    if !user.is_active {
        warn!("Sign-in attempt for inactive user {}", user.id);
        return Err(invalid());
    }

    let stored_hash = user.password_hash.clone().ok_or_else(invalid)?;
    if !password::verify_password_blocking(password.to_string(), stored_hash).await? {
        return Err(invalid());
    }

    let tokens = state.tokens.issue_pair(user.id)?;
    info!("User {} signed in", user.id);

    Ok((StatusCode::OK, Json(AuthResponse { message: "Login successful.", user, tokens })))
}

/// Revoke a refresh token
/// POST /api/signout/
pub async fn signout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<SignoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = request
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Refresh token is required."))?;

    let error_logging_out = || ApiError::validation("Error logging out.");

    let claims = state
        .tokens
        .verify(refresh_token.trim(), TokenType::Refresh)
        .map_err(|_| error_logging_out())?;

    if claims.sub != auth.user_id {
        warn!("User {} tried to revoke a token of user {}", auth.user_id, claims.sub);
        return Err(error_logging_out());
    }

    if !state.db.blacklist_token(claims.jti, claims.sub, claims.expires_at()).await? {
        return Err(error_logging_out());
    }

    info!("User {} signed out", auth.user_id);
    Ok((StatusCode::OK, message("Logout successful.")))
}

/// Current user profile
/// GET /api/userinfo/
pub async fn userinfo(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.get_user_by_id(auth.user_id).await?;
    Ok((StatusCode::OK, Json(user)))
}

/// Rotate a refresh token
/// POST /api/refresh_token/
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = request
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Refresh token is required."))?;

    let claims = state.tokens.verify(refresh_token.trim(), TokenType::Refresh)?;

    let user = state.db.get_user_by_id(claims.sub).await.map_err(|e| match e {
        ApiError::NotFound(_) => ApiError::unauthorized("User no longer exists"),
        other => other,
    })?;
    if !user.is_active {
        return Err(ApiError::unauthorized("User account is disabled"));
    }

    // single use: a token that is already revoked cannot be rotated again
    if !state.db.blacklist_token(claims.jti, claims.sub, claims.expires_at()).await? {
        warn!("Blacklisted refresh token {} presented for user {}", claims.jti, claims.sub);
        return Err(ApiError::unauthorized("Token is blacklisted"));
    }

    let tokens = state.tokens.issue_pair(user.id)?;
    info!("Rotated refresh token for user {}", user.id);

    Ok((StatusCode::OK, Json(TokenResponse { message: "Token refreshed successfully.", tokens })))
}

/// Start Google sign-in
/// GET /api/auth/google/login/
pub async fn google_login(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    if !state.google.is_configured() {
        return Err(ApiError::Internal(anyhow::anyhow!("Google OAuth is not configured")));
    }

    let oauth_state = state.tokens.issue_oauth_state()?;
    let location = state.google.authorization_url(&oauth_state);

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]))
}

/// Finish Google sign-in
/// GET /api/auth/google/callback/?code=...&state=...
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GoogleCallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = params.error {
        warn!("Google sign-in was denied: {}", error);
        return Err(ApiError::validation("Google authorization was denied"));
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::validation("Authorization code not provided"))?;

    let oauth_state = params
        .state
        .ok_or_else(|| ApiError::validation("Invalid OAuth state"))?;
    state
        .tokens
        .verify(&oauth_state, TokenType::OauthState)
        .map_err(|_| ApiError::validation("Invalid OAuth state"))?;

    let access_token = state.google.exchange_code(&code).await?;
    let info = state.google.fetch_user_info(&access_token).await?;

    let email = info.verified_email_address()?;

    let picture = info.picture.filter(|p| !p.is_empty());

    let user = match state.db.find_user_by_email(&email).await? {
        Some(user) => {
            if !user.is_active {
                return Err(ApiError::validation("Invalid credentials."));
            }
            match picture {
                Some(ref picture) if user.profile_picture.as_deref().unwrap_or("").is_empty() => {
                    state.db.set_profile_picture_if_empty(user.id, picture).await?
                }
                _ => user,
            }
        }
        None => {
            let user = state
                .db
                .create_user(NewUser {
                    email,
                    password_hash: None,
                    first_name: oauth_name(info.given_name),
                    last_name: oauth_name(info.family_name),
                    profile_picture: picture,
                    is_oauth: true,
                })
                .await?;
            signals::user_created(&state, &user).await;
            info!("Created user {} from Google sign-in", user.id);
            user
        }
    };

    let tokens = state.tokens.issue_pair(user.id)?;
    info!("User {} signed in with Google", user.id);

    Ok((StatusCode::OK, Json(AuthResponse { message: "Login successful.", user, tokens })))
}

fn oauth_name(name: Option<String>) -> String {
    name.map(|n| n.trim().chars().take(MAX_NAME_LENGTH).collect::<String>())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

/// Change the password of the signed-in user
/// POST /api/change_password/
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.get_user_by_id(auth.user_id).await?;

    // accounts created through Google may set a first password without one
    if let Some(stored_hash) = user.password_hash {
        let old_password = request
            .old_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::validation("Old password is required."))?;

        if !password::verify_password_blocking(old_password.clone(), stored_hash).await? {
            return Err(ApiError::validation("Old password is incorrect."));
        }

        if old_password == request.new_password {
            return Err(ApiError::validation("New password must be different from the old password."));
        }
    }

    password::validate_password_strength(&request.new_password).map_err(ApiError::Validation)?;

    let new_hash = password::hash_password_blocking(request.new_password).await?;
    state.db.set_password(user.id, &new_hash).await?;

    Ok((StatusCode::OK, message("Password changed successfully.")))
}

/// Email a one-time password reset code
/// POST /api/reset_password/
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email format"));
    }

    let user = state
        .db
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let code = otp::generate_otp();
    let lifetime = state.config.auth.otp_lifetime;
    let expires_at = Utc::now()
        + chrono::Duration::from_std(lifetime).map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    state
        .db
        .create_password_reset_otp(user.id, &otp::hash_otp(&code), expires_at)
        .await?;

    let email_message = templates::password_reset_otp(
        &user.email,
        &user.first_name,
        &code,
        lifetime.as_secs() / 60,
        &state.config.email.subject_prefix,
    );
    state.jobs.enqueue(Job::SendEmail(email_message)).await?;

    info!("Password reset code issued for user {}", user.id);
    Ok((StatusCode::OK, message("A password reset code has been sent to your email.")))
}

/// Verify a reset code and set the new password
/// POST /api/verify_otp/
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !otp::is_well_formed(&request.otp) {
        return Err(ApiError::validation(INVALID_CODE));
    }

    password::validate_password_strength(&request.new_password).map_err(ApiError::Validation)?;

    let user = state
        .db
        .find_user_by_email(&normalize_email(&request.email))
        .await?
        .ok_or_else(|| ApiError::validation(INVALID_CODE))?;

    let reset = state
        .db
        .active_password_reset_otp(user.id)
        .await?
        .ok_or_else(|| ApiError::validation(INVALID_CODE))?;

    if reset.is_expired(Utc::now()) {
        return Err(ApiError::validation(INVALID_CODE));
    }

    let max_attempts = state.config.auth.otp_max_attempts;
    if reset.attempts_exhausted(max_attempts) {
        return Err(ApiError::validation(TOO_MANY_ATTEMPTS));
    }

    // the attempt is counted before the code is compared
    let Some(attempts) = state.db.claim_otp_attempt(reset.id, max_attempts).await? else {
        warn!("Reset code attempts exhausted for user {}", user.id);
        return Err(ApiError::validation(TOO_MANY_ATTEMPTS));
    };

    if !otp::otp_matches(&request.otp, &reset.code_hash) {
        warn!(attempts, "Wrong password reset code for user {}", user.id);
        return Err(ApiError::validation(INVALID_CODE));
    }

    let new_hash = password::hash_password_blocking(request.new_password).await?;
    state.db.complete_password_reset(user.id, reset.id, &new_hash).await?;

    Ok((StatusCode::OK, message("Password has been reset successfully.")))
}
