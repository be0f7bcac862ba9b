//! Repository for the `prompt_templates` table.

use relay_core::types::DbId;
use sqlx::PgPool;

use crate::models::prompt_template::{CreatePromptTemplate, PromptTemplate, DISPATCH_ROLE};

/// Column list for `prompt_templates` queries.
const COLUMNS: &str = "\
    id, name, role, tags, content, preferred_model, is_active, created_at, updated_at";

pub struct PromptTemplateRepo;

impl PromptTemplateRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreatePromptTemplate,
    ) -> Result<PromptTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO prompt_templates (name, role, tags, content, preferred_model, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PromptTemplate>(&query)
            .bind(&input.name)
            .bind(input.role.as_deref().unwrap_or(DISPATCH_ROLE))
            .bind(&input.tags)
            .bind(&input.content)
            .bind(&input.preferred_model)
            .bind(input.is_active.unwrap_or(true))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PromptTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM prompt_templates WHERE id = $1");
        sqlx::query_as::<_, PromptTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active templates of `role` in creation order.
    ///
    /// The order matters: the dispatcher keeps the first of equally
    /// scored templates.
    pub async fn list_active(pool: &PgPool, role: &str) -> Result<Vec<PromptTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM prompt_templates \
             WHERE is_active AND role = $1 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, PromptTemplate>(&query)
            .bind(role)
            .fetch_all(pool)
            .await
    }
}
