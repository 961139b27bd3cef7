use std::sync::Arc;

use crate::auth::google::{GoogleProvider, IdentityProvider};
use crate::auth::otp::OtpStore;
use crate::config::AppConfig;
use crate::db;
use crate::storage::{Backend, ComponentStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Backend,
    pub users: Arc<dyn UserStore>,
    pub components: Arc<dyn ComponentStore>,
    pub otps: Arc<OtpStore>,
    /// `None` when Google credentials are not configured.
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let backend = db::select_backend(&config).await;

        let identity = match &config.google {
            Some(google) => {
                Some(Arc::new(GoogleProvider::new(google.clone())?) as Arc<dyn IdentityProvider>)
            }
            None => {
                tracing::warn!("Google OAuth credentials not found; Google login is disabled");
                None
            }
        };

        Ok(Self::from_parts(config, backend, identity))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        backend: Backend,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let (users, components) = backend.stores();
        tracing::info!(backend = backend.name(), "storage backend selected");
        Self {
            config,
            backend,
            users,
            components,
            otps: Arc::new(OtpStore::default()),
            identity,
        }
    }

    /// Memory-backed state with a fixed test configuration.
    #[cfg(test)]
    pub fn fake() -> Self {
        let mut config = AppConfig::from_lookup(|_| None).expect("fallback config");
        config.jwt = crate::config::JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_days: 7,
        };
        Self::from_parts(Arc::new(config), Backend::Memory, None)
    }

    #[cfg(test)]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }
}
