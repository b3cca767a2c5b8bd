//! PostgreSQL implementation of CampaignStore.
//!
//! Tables read (owned by the CRUD tier's migrations):
//! `campaigns`, `campaign_contact_lists`, `contact_list_members`,
//! `contacts`, `messaging_accounts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::campaign::{
    AccountCredentials, Campaign, CampaignStatus, Contact, RateLimit, TemplateRef,
};
use crate::domain::foundation::{
    CampaignId, ContactId, DomainError, ErrorCode, OrganizationId, Timestamp,
};
use crate::ports::CampaignStore;

/// PostgreSQL implementation of CampaignStore.
#[derive(Clone)]
pub struct PostgresCampaignStore {
    pool: PgPool,
}

impl PostgresCampaignStore {
    /// Creates a new PostgresCampaignStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn campaign_exists(&self, campaign_id: &CampaignId) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM campaigns WHERE id = $1)")
            .bind(campaign_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("check campaign"))
    }
}

#[async_trait]
impl CampaignStore for PostgresCampaignStore {
    async fn list_running_campaigns(
        &self,
    ) -> Result<Vec<(Campaign, Option<AccountCredentials>)>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.organization_id, c.name, c.status,
                c.template_name, c.template_language, c.template_parameters,
                c.dispatch_cursor, c.rate_limit_messages, c.rate_limit_interval_ms,
                c.created_at, c.updated_at,
                ARRAY(
                    SELECT l.contact_list_id FROM campaign_contact_lists l
                    WHERE l.campaign_id = c.id
                    ORDER BY l.contact_list_id
                ) AS contact_list_ids,
                a.account_id, a.phone_number_id, a.access_token, a.api_base_url
            FROM campaigns c
            LEFT JOIN messaging_accounts a ON a.id = c.messaging_account_id
            WHERE c.status = $1
            ORDER BY c.created_at
            "#,
        )
        .bind(CampaignStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list running campaigns"))?;

        // A single undecodable campaign must not hide the others.
        Ok(decode_each(&rows, campaign_from_row, |row| row.try_get::<Uuid, _>("id").ok()))
    }

    async fn fetch_contact_page(
        &self,
        campaign_id: &CampaignId,
        after: Option<ContactId>,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError> {
        // EXISTS keeps contacts on several of the campaign's lists to one row.
        let rows = sqlx::query(
            r#"
            SELECT ct.id, ct.phone_number, ct.name, ct.attributes
            FROM contacts ct
            WHERE EXISTS (
                SELECT 1
                FROM contact_list_members m
                JOIN campaign_contact_lists l ON l.contact_list_id = m.contact_list_id
                WHERE l.campaign_id = $1 AND m.contact_id = ct.id
            )
            AND ($2::BIGINT IS NULL OR ct.id > $2)
            ORDER BY ct.id ASC
            LIMIT $3
            "#,
        )
        .bind(campaign_id.as_uuid())
        .bind(after.map(|c| c.value()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch contact page"))?;

        rows.iter().map(contact_from_row).collect()
    }

    async fn update_campaign_cursor(
        &self,
        campaign_id: &CampaignId,
        cursor: ContactId,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                dispatch_cursor = $2,
                updated_at = NOW()
            WHERE id = $1 AND (dispatch_cursor IS NULL OR dispatch_cursor < $2)
            "#,
        )
        .bind(campaign_id.as_uuid())
        .bind(cursor.value())
        .execute(&self.pool)
        .await
        .map_err(db_error("update campaign cursor"))?;

        if result.rows_affected() == 0 && !self.campaign_exists(campaign_id).await? {
            return Err(not_found(campaign_id));
        }
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(campaign_id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("update campaign status"))?;

        if result.rows_affected() == 0 {
            return Err(not_found(campaign_id));
        }
        Ok(())
    }
}

/// Decodes every row it can. Rows that fail are logged with their id and
/// left out.
fn decode_each<R, T>(
    rows: &[R],
    decode: impl Fn(&R) -> Result<T, DomainError>,
    id_of: impl Fn(&R) -> Option<Uuid>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(
                    campaign_id = ?id_of(row),
                    error = %e,
                    "Skipping campaign row that failed to decode"
                );
                None
            }
        })
        .collect()
}

fn campaign_from_row(row: &PgRow) -> Result<(Campaign, Option<AccountCredentials>), DomainError> {
    let status: String = get(row, "status")?;
    let parameters: Option<Json<Vec<String>>> = get(row, "template_parameters")?;
    let cursor: Option<i64> = get(row, "dispatch_cursor")?;
    let messages: i32 = get(row, "rate_limit_messages")?;
    let interval_ms: i64 = get(row, "rate_limit_interval_ms")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    let updated_at: DateTime<Utc> = get(row, "updated_at")?;

    let template = TemplateRef::new(
        get::<String>(row, "template_name")?,
        get::<String>(row, "template_language")?,
    )
    .with_parameters(parameters.map(|p| p.0).unwrap_or_default());

    let campaign = Campaign {
        id: CampaignId::from_uuid(get::<Uuid>(row, "id")?),
        organization_id: OrganizationId::from_uuid(get::<Uuid>(row, "organization_id")?),
        name: get(row, "name")?,
        status: status.parse()?,
        template,
        contact_list_ids: get(row, "contact_list_ids")?,
        cursor: cursor.map(ContactId::new),
        // Negative values from the table become zero and fail `is_valid`.
        rate_limit: RateLimit::new(
            u32::try_from(messages).unwrap_or(0),
            Duration::from_millis(u64::try_from(interval_ms).unwrap_or(0)),
        ),
        created_at: Timestamp::from_datetime(created_at),
        updated_at: Timestamp::from_datetime(updated_at),
    };

    let account_id: Option<String> = get(row, "account_id")?;
    let credentials = match account_id {
        Some(account_id) => Some(AccountCredentials {
            account_id,
            phone_number_id: get::<Option<String>>(row, "phone_number_id")?.unwrap_or_default(),
            access_token: SecretString::new(
                get::<Option<String>>(row, "access_token")?.unwrap_or_default(),
            ),
            api_base_url: get(row, "api_base_url")?,
        }),
        None => None,
    };

    Ok((campaign, credentials))
}

fn contact_from_row(row: &PgRow) -> Result<Contact, DomainError> {
    let attributes: Option<Json<HashMap<String, String>>> = get(row, "attributes")?;
    Ok(Contact {
        id: ContactId::new(get(row, "id")?),
        phone_number: get(row, "phone_number")?,
        name: get(row, "name")?,
        attributes: attributes.map(|a| a.0).unwrap_or_default(),
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to read column {}: {}", column, e),
        )
    })
}

fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

fn not_found(campaign_id: &CampaignId) -> DomainError {
    DomainError::new(
        ErrorCode::CampaignNotFound,
        format!("Campaign {} not found", campaign_id),
    )
}
