use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::business::{Business, BusinessSettings};
use crate::models::promotion::Promotion;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown pass token")]
    NotFound,

    #[error("Pass join is missing its {0} record")]
    Incomplete(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord {
    pub id: Uuid,
    pub token: String,
    pub business_id: Uuid,
    pub customer_card_id: Uuid,
    pub promotion_id: Option<Uuid>,
    pub pass_kind: String,
    pub is_revoked: bool,
    pub download_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Loyalty progress as seen at generation time. `stamps` is mutated by the
/// stamping flow; here it is a read-only snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyProgress {
    pub loyalty_card_id: Uuid,
    pub stamps: i32,
    pub stamps_required: i32,
    pub reward: Option<String>,
}

/// A pass record plus everything joined to it, loaded in one read so the
/// pieces can never come from inconsistent snapshots.
#[derive(Debug, Clone)]
pub struct ResolvedPass {
    pub pass: PassRecord,
    pub business: Business,
    pub loyalty: LoyaltyProgress,
    pub promotion: Option<Promotion>,
}

/// Flat projection of the five-way join. Joined columns are nullable because
/// of the LEFT JOINs; absence is promoted to `ResolveError::Incomplete`.
#[derive(Debug, FromRow)]
struct PassJoinRow {
    id: Uuid,
    token: String,
    business_id: Uuid,
    customer_card_id: Uuid,
    promotion_id: Option<Uuid>,
    pass_kind: String,
    is_revoked: bool,
    download_count: i32,
    created_at: DateTime<Utc>,

    business_name: Option<String>,
    business_logo_url: Option<String>,
    business_primary_color: Option<String>,
    business_secondary_color: Option<String>,
    business_background_color: Option<String>,
    business_text_color: Option<String>,
    business_card_title: Option<String>,
    business_card_description: Option<String>,
    business_settings: Option<JsonValue>,

    loyalty_card_id: Option<Uuid>,
    stamps: Option<i32>,
    stamps_required: Option<i32>,
    loyalty_reward: Option<String>,

    promotion_name: Option<String>,
    promotion_reward: Option<String>,
    promotion_starts_at: Option<DateTime<Utc>>,
    promotion_ends_at: Option<DateTime<Utc>>,
}

impl ResolvedPass {
    /// Loads a pass and its business, loyalty and promotion sides by token.
    #[tracing::instrument(skip(pool))]
    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Self, ResolveError> {
        let row = sqlx::query_as::<_, PassJoinRow>(
            r#"
            SELECT
                p.id, p.token, p.business_id, p.customer_card_id, p.promotion_id,
                p.pass_kind, p.is_revoked, p.download_count, p.created_at,
                b.name AS business_name,
                b.logo_url AS business_logo_url,
                b.primary_color AS business_primary_color,
                b.secondary_color AS business_secondary_color,
                b.background_color AS business_background_color,
                b.text_color AS business_text_color,
                b.card_title AS business_card_title,
                b.card_description AS business_card_description,
                b.settings AS business_settings,
                lc.id AS loyalty_card_id,
                cc.stamps AS stamps,
                lc.stamps_required AS stamps_required,
                lc.reward AS loyalty_reward,
                pr.name AS promotion_name,
                pr.reward AS promotion_reward,
                pr.starts_at AS promotion_starts_at,
                pr.ends_at AS promotion_ends_at
            FROM passes p
            LEFT JOIN businesses b ON b.id = p.business_id
            LEFT JOIN customer_cards cc ON cc.id = p.customer_card_id
            LEFT JOIN loyalty_cards lc ON lc.id = cc.loyalty_card_id
            LEFT JOIN promotions pr ON pr.id = p.promotion_id
            WHERE p.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(ResolveError::NotFound)?;

        Self::from_row(row)
    }

    fn from_row(row: PassJoinRow) -> Result<Self, ResolveError> {
        let business_name = row.business_name.ok_or(ResolveError::Incomplete("business"))?;

        let loyalty = LoyaltyProgress {
            loyalty_card_id: row
                .loyalty_card_id
                .ok_or(ResolveError::Incomplete("loyalty card"))?,
            stamps: row.stamps.ok_or(ResolveError::Incomplete("customer card"))?,
            stamps_required: row
                .stamps_required
                .ok_or(ResolveError::Incomplete("loyalty card"))?,
            reward: row.loyalty_reward,
        };

        let business = Business {
            id: row.business_id,
            name: business_name,
            logo_url: row.business_logo_url,
            primary_color: row.business_primary_color,
            secondary_color: row.business_secondary_color,
            background_color: row.business_background_color,
            text_color: row.business_text_color,
            card_title: row.business_card_title,
            card_description: row.business_card_description,
            settings: BusinessSettings::from_json(row.business_settings),
        };

        let promotion = match (row.promotion_id, row.promotion_name) {
            (Some(id), Some(name)) => Some(Promotion {
                id,
                name,
                reward: row.promotion_reward,
                starts_at: row.promotion_starts_at,
                ends_at: row.promotion_ends_at,
            }),
            _ => None,
        };

        Ok(Self {
            pass: PassRecord {
                id: row.id,
                token: row.token,
                business_id: row.business_id,
                customer_card_id: row.customer_card_id,
                promotion_id: row.promotion_id,
                pass_kind: row.pass_kind,
                is_revoked: row.is_revoked,
                download_count: row.download_count,
                created_at: row.created_at,
            },
            business,
            loyalty,
            promotion,
        })
    }
}
