//! Postgres adapters for the CRM collaborators (proposals, documents,
//! notifications). The tables belong to the CRM; only the columns the
//! automation engine needs are touched.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    BaseDocumentLoader, BaseNotifier, BaseProposalCreator, DocumentResult, NewProposal,
    Notification,
};

// =============================================================================
// Proposals
// =============================================================================

pub struct PgProposalCreator {
    pool: PgPool,
}

impl PgProposalCreator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseProposalCreator for PgProposalCreator {
    async fn create_proposal(&self, proposal: NewProposal) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO proposals
                (tenant_id, user_id, entity_type, action, payload, source,
                 automation_config_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING id
            "#,
        )
        .bind(proposal.tenant_id)
        .bind(proposal.user_id)
        .bind(&proposal.entity_type)
        .bind(&proposal.action)
        .bind(serde_json::Value::Object(proposal.payload))
        .bind(&proposal.source)
        .bind(proposal.automation_config_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

// =============================================================================
// Documents
// =============================================================================

pub struct PgDocumentLoader {
    pool: PgPool,
}

impl PgDocumentLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseDocumentLoader for PgDocumentLoader {
    async fn get_document_by_id(&self, id: i64) -> Result<Option<DocumentResult>> {
        let row: Option<(Vec<u8>, String, String)> = sqlx::query_as(
            "SELECT content, content_type, filename FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(content, content_type, filename)| DocumentResult {
            content,
            content_type,
            filename,
        }))
    }
}

// =============================================================================
// Notifications
// =============================================================================

pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseNotifier for PgNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let kind = serde_json::to_value(notification.kind)?;
        sqlx::query(
            r#"
            INSERT INTO notifications (tenant_id, user_id, kind, message, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.tenant_id)
        .bind(notification.user_id)
        .bind(kind.as_str().unwrap_or("automation"))
        .bind(&notification.message)
        .bind(serde_json::json!({ "automation_config_id": notification.config_id }))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
