use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, ProfileResponse, PublicUser,
            SendOtpRequest, SignupRequest, SignupResponse, VerifyOtpRequest,
        },
        extractors::AuthUser,
        google::{google_callback, google_login},
        repo_types::NewUser,
        services::{
            hash_password, is_valid_email, meets_password_policy, verify_password, JwtKeys,
            MIN_PASSWORD_LEN,
        },
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/profile", get(profile))
}

pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/google", get(google_login))
        .route("/google/callback", get(google_callback))
}

/// Trimmed, non-empty value of an optional request field.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let phone = present(&payload.phone_number)
        .ok_or_else(|| AppError::bad_request("Phone number required"))?;

    let code = state.otps.issue(phone).await;
    // No SMS provider is wired up; the code only reaches the log.
    info!(phone = %phone, otp = %code, "OTP issued");
    Ok(Json(MessageResponse::new("OTP sent")))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let (Some(phone), Some(otp)) = (present(&payload.phone_number), present(&payload.otp)) else {
        return Err(AppError::bad_request("Invalid or expired OTP"));
    };
    if !state.otps.verify(phone, otp).await {
        warn!(phone = %phone, "OTP rejected");
        return Err(AppError::bad_request("Invalid or expired OTP"));
    }
    Ok(Json(MessageResponse::new("OTP verified")))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let (Some(username), Some(email), Some(password)) = (
        present(&payload.username),
        present(&payload.email),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::bad_request(
            "All fields are required: username, email, password",
        ));
    };
    let email = email.to_lowercase();

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }

    if !meets_password_policy(password) {
        warn!("password too short");
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::bad_request("Email already registered"));
    }
    if state.users.find_by_username(username).await?.is_some() {
        warn!(username = %username, "username already taken");
        return Err(AppError::bad_request("Username already taken"));
    }

    let password_hash =
        hash_password(password).map_err(|e| AppError::internal("Server error during signup", e))?;

    // The store re-checks uniqueness, so a concurrent signup still gets a 400.
    let user = state
        .users
        .create(NewUser {
            username: username.to_string(),
            email,
            password_hash,
            full_name: username.to_string(),
            profile_pic: String::new(),
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User registered successfully".into(),
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (Some(email), Some(password)) = (
        present(&payload.email),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::bad_request("Email and password are required"));
    };
    let email = email.to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::bad_request("Invalid email or password"));
    };

    let ok = verify_password(password, &user.password_hash)
        .map_err(|e| AppError::internal("Server error during login", e))?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::bad_request("Invalid email or password"));
    }

    let token = JwtKeys::from_ref(&state)
        .sign(&user)
        .map_err(|e| AppError::internal("Server error during login", e))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        user: PublicUser::from(user),
        token,
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(ProfileResponse {
        user: PublicUser::from(user),
    }))
}
