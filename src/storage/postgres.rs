use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ComponentStore, StoreError, StoreResult, UserStore};
use crate::{
    auth::repo_types::{NewUser, User},
    components::repo_types::{
        CodeBundle, ComponentPatch, ComponentQuery, NewComponent, Page, UiComponent,
    },
};

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, profile_pic, created_at";
const COMPONENT_COLUMNS: &str = "id, title, description, category, code, preview, tags, author, \
                                 likes, downloads, is_public, created_at, updated_at";

/// Postgres-backed store; the schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct ComponentRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    code: Json<CodeBundle>,
    preview: String,
    tags: Vec<String>,
    author: String,
    likes: Vec<String>,
    downloads: i64,
    is_public: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ComponentRow> for UiComponent {
    type Error = StoreError;

    fn try_from(r: ComponentRow) -> Result<Self, Self::Error> {
        let category = r
            .category
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("component {}: {e}", r.id)))?;
        Ok(Self {
            id: r.id,
            title: r.title,
            description: r.description,
            category,
            code: r.code.0,
            preview: r.preview,
            tags: r.tags,
            author: r.author,
            likes: r.likes,
            downloads: r.downloads,
            is_public: r.is_public,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn into_component(row: Option<ComponentRow>) -> StoreResult<Option<UiComponent>> {
    row.map(UiComponent::try_from).transpose()
}

/// `%needle%` for ILIKE with the pattern metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ComponentQuery) {
    qb.push(" WHERE is_public = TRUE");
    if let Some(category) = query.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(search) = query.search.as_deref() {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("users_username_key") => StoreError::UsernameTaken,
                _ => StoreError::EmailTaken,
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let user = user.into_user(Uuid::new_v4(), OffsetDateTime::now_utc());
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, full_name, profile_pic, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.profile_pic)
        .bind(user.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;
        Ok(created)
    }

    async fn set_profile_pic(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET profile_pic = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl ComponentStore for PgStore {
    async fn list(&self, query: &ComponentQuery) -> StoreResult<Page<UiComponent>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ui_components");
        push_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {COMPONENT_COLUMNS} FROM ui_components"));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        let rows = select
            .build_query_as::<ComponentRow>()
            .fetch_all(&self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(UiComponent::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<UiComponent>> {
        let row = sqlx::query_as::<_, ComponentRow>(&format!(
            "SELECT {COMPONENT_COLUMNS} FROM ui_components WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        into_component(row)
    }

    async fn create(&self, component: NewComponent) -> StoreResult<UiComponent> {
        let c = component.into_component(Uuid::new_v4(), OffsetDateTime::now_utc());
        let row = sqlx::query_as::<_, ComponentRow>(&format!(
            r#"
            INSERT INTO ui_components
                (id, title, description, category, code, preview, tags, author,
                 likes, downloads, is_public, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {COMPONENT_COLUMNS}
            "#
        ))
        .bind(c.id)
        .bind(&c.title)
        .bind(&c.description)
        .bind(c.category.as_str())
        .bind(Json(&c.code))
        .bind(&c.preview)
        .bind(&c.tags)
        .bind(&c.author)
        .bind(&c.likes)
        .bind(c.downloads)
        .bind(c.is_public)
        .bind(c.created_at)
        .bind(c.updated_at)
        .fetch_one(&self.db)
        .await?;
        UiComponent::try_from(row)
    }

    async fn update(&self, id: Uuid, patch: ComponentPatch) -> StoreResult<Option<UiComponent>> {
        let row = sqlx::query_as::<_, ComponentRow>(&format!(
            r#"
            UPDATE ui_components SET
                title       = COALESCE($2, title),
                description = COALESCE($3, description),
                category    = COALESCE($4, category),
                code        = COALESCE($5, code),
                preview     = COALESCE($6, preview),
                tags        = COALESCE($7, tags),
                is_public   = COALESCE($8, is_public),
                updated_at  = now()
            WHERE id = $1
            RETURNING {COMPONENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.code.map(Json))
        .bind(patch.preview)
        .bind(patch.tags)
        .bind(patch.is_public)
        .fetch_optional(&self.db)
        .await?;
        into_component(row)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM ui_components WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_like(&self, id: Uuid, user_id: &str) -> StoreResult<Option<UiComponent>> {
        let row = sqlx::query_as::<_, ComponentRow>(&format!(
            r#"
            UPDATE ui_components SET
                likes = CASE WHEN $2 = ANY(likes) THEN array_remove(likes, $2)
                             ELSE array_append(likes, $2) END,
                updated_at = now()
            WHERE id = $1
            RETURNING {COMPONENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        into_component(row)
    }

    async fn increment_downloads(&self, id: Uuid) -> StoreResult<Option<UiComponent>> {
        let row = sqlx::query_as::<_, ComponentRow>(&format!(
            r#"
            UPDATE ui_components SET downloads = downloads + 1, updated_at = now()
            WHERE id = $1
            RETURNING {COMPONENT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        into_component(row)
    }
}
