use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Article {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Article {
    fn entity_type() -> &'static str { "article" }
    fn subject_id(&self) -> i64 { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ArticleCreateRequest {
    pub author_id: i64,
    #[schema(example = "Getting started")]
    pub title: String,
    #[schema(example = "First paragraph...")]
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ArticleUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
}
