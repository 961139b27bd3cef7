//! Storage abstraction shared by every handler.
//!
//! One backend is chosen at startup: Postgres when the database answers within
//! the connect timeout, otherwise the in-process memory store. Handlers only
//! ever see the [`UserStore`] and [`ComponentStore`] traits.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    components::repo_types::{ComponentPatch, ComponentQuery, NewComponent, Page, UiComponent},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,

    #[error("username already taken")]
    UsernameTaken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `email` is compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Fails with `EmailTaken` / `UsernameTaken` on a uniqueness conflict.
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    async fn set_profile_pic(&self, id: Uuid, url: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait ComponentStore: Send + Sync {
    /// Public components only, newest first.
    async fn list(&self, query: &ComponentQuery) -> StoreResult<Page<UiComponent>>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<UiComponent>>;
    async fn create(&self, component: NewComponent) -> StoreResult<UiComponent>;
    async fn update(&self, id: Uuid, patch: ComponentPatch) -> StoreResult<Option<UiComponent>>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn toggle_like(&self, id: Uuid, user_id: &str) -> StoreResult<Option<UiComponent>>;
    async fn increment_downloads(&self, id: Uuid) -> StoreResult<Option<UiComponent>>;
}

/// The backing store picked at startup.
#[derive(Clone)]
pub enum Backend {
    Postgres(PgPool),
    Memory,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Backend::Postgres(_))
    }

    /// Live connectivity check used by `/health`.
    pub async fn is_connected(&self) -> bool {
        match self {
            Backend::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            Backend::Memory => false,
        }
    }

    pub fn stores(&self) -> (Arc<dyn UserStore>, Arc<dyn ComponentStore>) {
        match self {
            Backend::Postgres(pool) => {
                let store = Arc::new(PgStore::new(pool.clone()));
                let users: Arc<dyn UserStore> = store.clone();
                let components: Arc<dyn ComponentStore> = store;
                (users, components)
            }
            Backend::Memory => {
                let store = Arc::new(MemoryStore::new());
                let users: Arc<dyn UserStore> = store.clone();
                let components: Arc<dyn ComponentStore> = store;
                (users, components)
            }
        }
    }
}
