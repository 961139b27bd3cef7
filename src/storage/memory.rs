use async_trait::async_trait;
use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ComponentStore, StoreError, StoreResult, UserStore};
use crate::{
    auth::repo_types::{NewUser, User},
    components::repo_types::{ComponentPatch, ComponentQuery, NewComponent, Page, UiComponent},
};

/// In-process fallback store. Contents are lost on restart.
///
/// Each map sits behind its own write lock, so read-modify-write operations
/// (like toggles, download counters) are atomic per record.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<IndexMap<Uuid, User>>,
    components: RwLock<IndexMap<Uuid, UiComponent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let user = user.into_user(Uuid::new_v4(), OffsetDateTime::now_utc());
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken);
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UsernameTaken);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_profile_pic(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|u| {
            u.profile_pic = url.to_string();
            u.clone()
        }))
    }
}

#[async_trait]
impl ComponentStore for MemoryStore {
    async fn list(&self, query: &ComponentQuery) -> StoreResult<Page<UiComponent>> {
        let needle = query.search.as_deref().map(str::to_lowercase);
        let components = self.components.read().await;

        // Reverse insertion order first so equal timestamps stay newest-first.
        let mut matched: Vec<&UiComponent> = components
            .values()
            .rev()
            .filter(|c| c.is_public)
            .filter(|c| query.category.map_or(true, |cat| c.category == cat))
            .filter(|c| needle.as_deref().map_or(true, |n| c.matches_search(n)))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<UiComponent>> {
        Ok(self.components.read().await.get(&id).cloned())
    }

    async fn create(&self, component: NewComponent) -> StoreResult<UiComponent> {
        let component = component.into_component(Uuid::new_v4(), OffsetDateTime::now_utc());
        self.components
            .write()
            .await
            .insert(component.id, component.clone());
        Ok(component)
    }

    async fn update(&self, id: Uuid, patch: ComponentPatch) -> StoreResult<Option<UiComponent>> {
        let mut components = self.components.write().await;
        Ok(components.get_mut(&id).map(|c| {
            c.apply(patch, OffsetDateTime::now_utc());
            c.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.components.write().await.shift_remove(&id).is_some())
    }

    async fn toggle_like(&self, id: Uuid, user_id: &str) -> StoreResult<Option<UiComponent>> {
        let mut components = self.components.write().await;
        Ok(components.get_mut(&id).map(|c| {
            c.toggle_like(user_id);
            c.updated_at = OffsetDateTime::now_utc();
            c.clone()
        }))
    }

    async fn increment_downloads(&self, id: Uuid) -> StoreResult<Option<UiComponent>> {
        let mut components = self.components.write().await;
        Ok(components.get_mut(&id).map(|c| {
            c.downloads += 1;
            c.updated_at = OffsetDateTime::now_utc();
            c.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::components::repo_types::{Category, CodeBundle};

    fn component(title: &str, category: Category, tags: &[&str]) -> NewComponent {
        let mut c = NewComponent::new(
            category,
            CodeBundle {
                html: "<div></div>".into(),
                ..Default::default()
            },
        );
        c.title = Some(title.into());
        c.description = Some(format!("{title} description"));
        c.tags = tags.iter().map(|t| t.to_string()).collect();
        c
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            full_name: username.into(),
            profile_pic: String::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_case_insensitive() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("alice", "Alice@Example.com"))
            .await
            .unwrap();
        let err = UserStore::create(&store, new_user("alice2", "alice@example.COM"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));

        let found = store.find_by_email("ALICE@example.com").await.unwrap();
        assert_eq!(found.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("bob", "bob@example.com"))
            .await
            .unwrap();
        let err = UserStore::create(&store, new_user("bob", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken));
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let store = MemoryStore::new();
        ComponentStore::create(&store, component("b1", Category::Buttons, &[]))
            .await
            .unwrap();
        ComponentStore::create(&store, component("c1", Category::Cards, &[]))
            .await
            .unwrap();
        ComponentStore::create(&store, component("b2", Category::Buttons, &[]))
            .await
            .unwrap();

        let query = ComponentQuery {
            category: Some(Category::Buttons),
            ..Default::default()
        };
        let page = store.list(&query).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|c| c.category == Category::Buttons));
        assert_eq!(page.items[0].title, "b2", "newest first");
    }

    #[tokio::test]
    async fn search_matches_tags() {
        let store = MemoryStore::new();
        ComponentStore::create(&store, component("Plain", Category::Cards, &["modern", "glass"]))
            .await
            .unwrap();
        ComponentStore::create(&store, component("Other", Category::Cards, &["retro"]))
            .await
            .unwrap();

        let query = ComponentQuery {
            search: Some("modern".into()),
            ..Default::default()
        };
        let page = store.list(&query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Plain");
    }

    #[tokio::test]
    async fn pagination_over_25_records() {
        let store = MemoryStore::new();
        for i in 0..25 {
            ComponentStore::create(&store, component(&format!("c{i}"), Category::Loaders, &[]))
                .await
                .unwrap();
        }
        let mut query = ComponentQuery {
            limit: 12,
            ..Default::default()
        };
        let first = store.list(&query).await.unwrap();
        assert_eq!(first.total, 25);
        assert_eq!(first.items.len(), 12);

        query.page = 3;
        let last = store.list(&query).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].title, "c0");

        query.page = 4;
        assert!(store.list(&query).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn private_components_are_not_listed() {
        let store = MemoryStore::new();
        let mut hidden = component("hidden", Category::Cards, &[]);
        hidden.is_public = false;
        let hidden = ComponentStore::create(&store, hidden).await.unwrap();

        let page = store.list(&ComponentQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(store.get(hidden.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_like_toggles_do_not_lose_updates() {
        let store = Arc::new(MemoryStore::new());
        let created = ComponentStore::create(store.as_ref(), component("x", Category::Buttons, &[]))
            .await
            .unwrap();
        let id = created.id;

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_like(id, &format!("user-{i}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let after = store.get(id).await.unwrap().unwrap();
        assert_eq!(after.likes.len(), 50);
    }

    #[tokio::test]
    async fn downloads_increment_by_one() {
        let store = MemoryStore::new();
        let created = ComponentStore::create(&store, component("x", Category::Inputs, &[]))
            .await
            .unwrap();
        assert_eq!(created.downloads, 0);
        for expected in 1..=3 {
            let c = store.increment_downloads(created.id).await.unwrap().unwrap();
            assert_eq!(c.downloads, expected);
        }
        assert!(store.increment_downloads(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_delete_missing_records() {
        let store = MemoryStore::new();
        let missing = Uuid::new_v4();
        assert!(store
            .update(missing, ComponentPatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete(missing).await.unwrap());
    }
}
