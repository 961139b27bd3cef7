//! Google sign-in via the OAuth 2.0 authorization-code flow.

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, Query, State},
    response::Redirect,
};
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{JwtKeys, OAuthCallback},
        repo_types::{NewUser, User},
        services::{hash_password, random_password},
    },
    config::GoogleOAuthConfig,
    error::AppError,
    state::AppState,
    storage::{StoreError, UserStore},
};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Identity as reported by the external provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page the browser is sent to.
    fn authorize_url(&self) -> String;
    /// Trades an authorization code for the user's profile.
    async fn exchange_code(&self, code: &str) -> anyhow::Result<ExternalProfile>;
}

pub struct GoogleProvider {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleOAuthConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("build OAuth http client")?;
        Ok(Self { config, http })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "profile email"),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| AUTHORIZE_URL.to_string())
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<ExternalProfile> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("token request")?
            .error_for_status()
            .context("token endpoint")?
            .json()
            .await
            .context("parse token response")?;

        let profile: ExternalProfile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("userinfo request")?
            .error_for_status()
            .context("userinfo endpoint")?
            .json()
            .await
            .context("parse userinfo response")?;
        Ok(profile)
    }
}

fn provider(state: &AppState) -> Result<&dyn IdentityProvider, AppError> {
    state
        .identity
        .as_deref()
        .ok_or_else(|| AppError::NotConfigured("Google OAuth is not configured".into()))
}

/// Finds the user by email or creates one; refreshes a changed profile picture.
pub async fn find_or_create_user(
    users: &dyn UserStore,
    profile: &ExternalProfile,
) -> anyhow::Result<User> {
    let picture = profile.picture.clone().unwrap_or_default();

    if let Some(user) = users.find_by_email(&profile.email).await? {
        if !picture.is_empty() && user.profile_pic != picture {
            if let Some(updated) = users.set_profile_pic(user.id, &picture).await? {
                return Ok(updated);
            }
        }
        return Ok(user);
    }

    let email = profile.email.to_lowercase();
    let base = email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("user")
        .to_string();
    let mut username = base.clone();
    let mut attempt = 0;
    loop {
        let candidate = NewUser {
            username: username.clone(),
            email: email.clone(),
            password_hash: hash_password(&random_password())?,
            full_name: profile.name.clone().unwrap_or_else(|| base.clone()),
            profile_pic: picture.clone(),
        };
        match users.create(candidate).await {
            Ok(user) => {
                info!(user_id = %user.id, email = %user.email, "user created from OAuth");
                return Ok(user);
            }
            Err(StoreError::UsernameTaken) if attempt < 5 => {
                attempt += 1;
                username = format!("{base}{}", rand::random::<u16>() % 10_000);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let provider = provider(&state)?;
    Ok(Redirect::to(&provider.authorize_url()))
}

#[instrument(skip(state, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
) -> Result<Redirect, AppError> {
    let provider = provider(&state)?;
    let frontend = state.config.frontend_url.clone();
    let failure = || Redirect::to(&format!("{frontend}/login"));

    if let Some(err) = params.error.as_deref() {
        warn!(error = %err, "OAuth provider returned an error");
        return Ok(failure());
    }
    let Some(code) = params.code.as_deref() else {
        warn!("OAuth callback without code");
        return Ok(failure());
    };

    let profile = match provider.exchange_code(code).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %format!("{e:#}"), "OAuth code exchange failed");
            return Ok(failure());
        }
    };

    let user = match find_or_create_user(state.users.as_ref(), &profile).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %format!("{e:#}"), "OAuth user lookup failed");
            return Ok(failure());
        }
    };

    let token = JwtKeys::from_ref(&state)
        .sign(&user)
        .map_err(|e| AppError::internal("Token signing failed", e))?;

    let url = Url::parse_with_params(
        &format!("{frontend}/"),
        &[
            ("token", token.as_str()),
            ("name", user.full_name.as_str()),
            ("email", user.email.as_str()),
            ("profilePic", user.profile_pic.as_str()),
        ],
    )
    .map_err(|e| AppError::internal("Invalid frontend URL", e))?;

    info!(user_id = %user.id, "OAuth login succeeded");
    Ok(Redirect::to(url.as_str()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    struct FakeProvider {
        profile: ExternalProfile,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self) -> String {
            "https://accounts.example/consent".into()
        }

        async fn exchange_code(&self, code: &str) -> anyhow::Result<ExternalProfile> {
            anyhow::ensure!(code == "good-code", "bad code");
            Ok(self.profile.clone())
        }
    }

    fn fake_state(picture: &str) -> AppState {
        AppState::fake().with_identity(Arc::new(FakeProvider {
            profile: ExternalProfile {
                email: "Grace@Example.com".into(),
                name: Some("Grace Hopper".into()),
                picture: Some(picture.into()),
            },
        }))
    }

    async fn get(state: AppState, uri: &str) -> axum::response::Response {
        build_app(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(resp: &axum::response::Response) -> String {
        resp.headers()
            .get(header::LOCATION)
            .expect("location header")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn routes_report_missing_configuration() {
        for uri in ["/api/auth/google", "/api/auth/google/callback?code=x"] {
            let resp = get(AppState::fake(), uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["message"], "Google OAuth is not configured");
        }
    }

    #[tokio::test]
    async fn login_redirects_to_consent_page() {
        let resp = get(fake_state("pic1"), "/api/auth/google").await;
        assert!(resp.status().is_redirection());
        assert_eq!(location(&resp), "https://accounts.example/consent");
    }

    #[tokio::test]
    async fn callback_creates_user_and_redirects_with_token() {
        let state = fake_state("https://img.example/p.png");
        let resp = get(state.clone(), "/api/auth/google/callback?code=good-code").await;
        assert!(resp.status().is_redirection());

        let url = Url::parse(&location(&resp)).unwrap();
        assert!(url.as_str().starts_with("http://localhost:5173/?"));
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["email"], "grace@example.com");
        assert_eq!(params["name"], "Grace Hopper");
        assert_eq!(params["profilePic"], "https://img.example/p.png");

        let claims = JwtKeys::from_ref(&state).verify(&params["token"]).unwrap();
        let user = state.users.find_by_id(claims.sub).await.unwrap().unwrap();
        assert_eq!(user.username, "grace");
    }

    #[tokio::test]
    async fn callback_failure_redirects_to_login() {
        let resp = get(fake_state("p"), "/api/auth/google/callback?code=bad").await;
        assert_eq!(location(&resp), "http://localhost:5173/login");

        let resp = get(fake_state("p"), "/api/auth/google/callback").await;
        assert_eq!(location(&resp), "http://localhost:5173/login");
    }

    #[tokio::test]
    async fn existing_user_gets_profile_picture_refreshed() {
        let state = AppState::fake();
        let first = ExternalProfile {
            email: "lin@example.com".into(),
            name: None,
            picture: Some("old.png".into()),
        };
        let created = find_or_create_user(state.users.as_ref(), &first).await.unwrap();
        assert_eq!(created.full_name, "lin");

        let second = ExternalProfile {
            picture: Some("new.png".into()),
            ..first
        };
        let again = find_or_create_user(state.users.as_ref(), &second).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.profile_pic, "new.png");
    }

    #[tokio::test]
    async fn username_collision_gets_suffix() {
        let state = AppState::fake();
        state
            .users
            .create(NewUser {
                username: "sam".into(),
                email: "sam@one.example".into(),
                password_hash: "x".into(),
                full_name: "sam".into(),
                profile_pic: String::new(),
            })
            .await
            .unwrap();

        let profile = ExternalProfile {
            email: "sam@two.example".into(),
            name: None,
            picture: None,
        };
        let user = find_or_create_user(state.users.as_ref(), &profile).await.unwrap();
        assert_ne!(user.username, "sam");
        assert!(user.username.starts_with("sam"));
    }
}
