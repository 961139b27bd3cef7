use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Fixed set of component categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    All,
    Buttons,
    Checkboxes,
    #[serde(rename = "Toggle switches")]
    ToggleSwitches,
    Cards,
    Loaders,
    Inputs,
    #[serde(rename = "Radio buttons")]
    RadioButtons,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::All,
        Category::Buttons,
        Category::Checkboxes,
        Category::ToggleSwitches,
        Category::Cards,
        Category::Loaders,
        Category::Inputs,
        Category::RadioButtons,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::All => "All",
            Category::Buttons => "Buttons",
            Category::Checkboxes => "Checkboxes",
            Category::ToggleSwitches => "Toggle switches",
            Category::Cards => "Cards",
            Category::Loaders => "Loaders",
            Category::Inputs => "Inputs",
            Category::RadioButtons => "Radio buttons",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// The snippet itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBundle {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiComponent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub code: CodeBundle,
    pub preview: String,
    pub tags: Vec<String>,
    pub author: String,
    pub likes: Vec<String>,
    pub downloads: i64,
    pub is_public: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UiComponent {
    /// Adds `user_id` to the likes, or removes it if already present.
    pub fn toggle_like(&mut self, user_id: &str) {
        match self.likes.iter().position(|u| u == user_id) {
            Some(idx) => {
                self.likes.remove(idx);
            }
            None => self.likes.push(user_id.to_string()),
        }
    }

    /// Case-insensitive substring match against title, description and tags.
    /// `needle` must already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    pub fn apply(&mut self, patch: ComponentPatch, now: OffsetDateTime) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(code) = patch.code {
            self.code = code;
        }
        if let Some(preview) = patch.preview {
            self.preview = preview;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(is_public) = patch.is_public {
            self.is_public = is_public;
        }
        self.updated_at = now;
    }
}

pub const DEFAULT_AUTHOR: &str = "local-user";

/// Input for creating a component. Missing title and description get defaults.
#[derive(Debug, Clone)]
pub struct NewComponent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Category,
    pub code: CodeBundle,
    pub preview: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub is_public: bool,
}

impl NewComponent {
    pub fn new(category: Category, code: CodeBundle) -> Self {
        Self {
            title: None,
            description: None,
            category,
            code,
            preview: None,
            tags: Vec::new(),
            author: None,
            is_public: true,
        }
    }

    pub fn into_component(self, id: Uuid, now: OffsetDateTime) -> UiComponent {
        let category = self.category;
        UiComponent {
            id,
            title: self
                .title
                .unwrap_or_else(|| format!("Component {}", now.unix_timestamp_nanos() / 1_000_000)),
            description: self
                .description
                .unwrap_or_else(|| format!("UI Component in {category} category")),
            category,
            code: self.code,
            preview: self.preview.unwrap_or_default(),
            tags: self.tags,
            author: self.author.unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            likes: Vec::new(),
            downloads: 0,
            is_public: self.is_public,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ComponentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub code: Option<CodeBundle>,
    pub preview: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

/// Listing parameters, already normalized by the handler.
#[derive(Debug, Clone)]
pub struct ComponentQuery {
    pub category: Option<Category>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ComponentQuery {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            page: 1,
            limit: 12,
        }
    }
}

impl ComponentQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

pub fn total_pages(total: u64, limit: u32) -> u64 {
    total.div_ceil(u64::from(limit.max(1)))
}

/// Trims tags and drops empty ones.
pub fn clean_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
