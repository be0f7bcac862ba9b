//! Prompt template rows used for dispatch matching and as system prompts.

use relay_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of templates considered by the dispatcher.
pub const DISPATCH_ROLE: &str = "pre";

/// A row from the `prompt_templates` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PromptTemplate {
    pub id: DbId,
    pub name: String,
    pub role: String,
    /// Comma-separated keywords.
    pub tags: String,
    pub content: String,
    pub preferred_model: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a template.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePromptTemplate {
    pub name: String,
    /// Defaults to [`DISPATCH_ROLE`].
    pub role: Option<String>,
    pub tags: String,
    pub content: String,
    pub preferred_model: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}
