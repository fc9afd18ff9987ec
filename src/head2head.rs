// src/head2head.rs
//! Two-party matches. A match starts `pending` and only its invitee can move
//! it to `active`. Completion is decided downstream of this module and no
//! cancel operation is exposed yet, so `completed` and `cancelled` are never
//! written here.

use chrono::Utc;
use sqlx::types::Json;
use tracing::info;
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::models::{Match, MatchRow, MatchStatus, UserId};
use crate::notification::Notifications;

#[derive(Clone)]
pub struct MatchService {
    store: Store,
    notifications: Notifications,
}

impl MatchService {
    pub fn new(store: Store, notifications: Notifications) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn create_match(
        &self,
        inviter: UserId,
        invitee: UserId,
        categories: Vec<String>,
    ) -> CoreResult<Match> {
        if inviter == invitee {
            return Err(CoreError::invalid("cannot invite yourself to a match"));
        }
        let categories = validate_categories(categories)?;

        let now = Utc::now();
        let created = Match {
            id: Uuid::new_v4(),
            inviter_id: inviter,
            invitee_id: invitee,
            status: MatchStatus::Pending,
            categories,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO head2head_matches
                (id, inviter_id, invitee_id, status, categories, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(created.id)
        .bind(created.inviter_id)
        .bind(created.invitee_id)
        .bind(created.status.as_str())
        .bind(Json(created.categories.clone()))
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(self.store.pool())
        .await?;

        info!(match_id = %created.id, %inviter, %invitee, "match created");
        self.notifications.match_invited(invitee);
        Ok(created)
    }

    /// `pending -> active`, allowed only for the invitee. The status check
    /// lives in the UPDATE itself so two racing accepts transition once.
    pub async fn accept_match(&self, match_id: Uuid, caller: UserId) -> CoreResult<Match> {
        let result = sqlx::query(
            r#"
            UPDATE head2head_matches
            SET status = ?, updated_at = ?
            WHERE id = ? AND invitee_id = ? AND status = ?
            "#,
        )
        .bind(MatchStatus::Active.as_str())
        .bind(Utc::now())
        .bind(match_id)
        .bind(caller)
        .bind(MatchStatus::Pending.as_str())
        .execute(self.store.pool())
        .await?;

        // Outsiders see NotFound whether or not the match exists.
        let current = self
            .find(match_id)
            .await?
            .filter(|m| m.inviter_id == caller || m.invitee_id == caller)
            .ok_or(CoreError::NotFound)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::InvalidTransition);
        }

        info!(%match_id, invitee = %caller, status = %current.status, "match accepted");
        self.notifications.match_accepted(current.inviter_id);
        Ok(current)
    }

    /// Visible to the two participants only, like `accept_match`.
    pub async fn get_match(&self, match_id: Uuid, caller: UserId) -> CoreResult<Match> {
        self.find(match_id)
            .await?
            .filter(|m| m.inviter_id == caller || m.invitee_id == caller)
            .ok_or(CoreError::NotFound)
    }

    async fn find(&self, match_id: Uuid) -> CoreResult<Option<Match>> {
        let row = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT id, inviter_id, invitee_id, status, categories, created_at, updated_at
            FROM head2head_matches
            WHERE id = ?
            "#,
        )
        .bind(match_id)
        .fetch_optional(self.store.pool())
        .await?;

        row.map(Match::try_from).transpose().map_err(CoreError::from)
    }
}

fn validate_categories(categories: Vec<String>) -> CoreResult<Vec<String>> {
    if categories.is_empty() {
        return Err(CoreError::invalid("at least one category is required"));
    }

    categories
        .into_iter()
        .map(|category| {
            let category = category.trim();
            if category.is_empty() {
                Err(CoreError::invalid("categories must not be blank"))
            } else {
                Ok(category.to_string())
            }
        })
        .collect()
}
