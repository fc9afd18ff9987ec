// src/vote.rs
use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqliteExecutor;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{is_unique_violation, Store};
use crate::error::{CoreError, CoreResult};
use crate::models::{NewOption, PollOption, PollResult, PollVote, UserId};
use crate::notification::Notifications;

/// Options, votes and the tallies derived from them.
#[derive(Clone)]
pub struct VotingLedger {
    store: Store,
    notifications: Notifications,
}

impl VotingLedger {
    pub fn new(store: Store, notifications: Notifications) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// The same restaurant may be added more than once; that is left to the caller.
    pub async fn add_option(&self, poll_id: Uuid, option: NewOption) -> CoreResult<PollOption> {
        let option = validate_option(option)?;
        ensure_poll_exists(self.store.pool(), poll_id).await?;

        let added = insert_option(self.store.pool(), poll_id, option).await?;
        info!(%poll_id, option_id = %added.id, "option added");
        Ok(added)
    }

    /// Adds every option or none of them.
    pub async fn add_options(
        &self,
        poll_id: Uuid,
        options: Vec<NewOption>,
    ) -> CoreResult<Vec<PollOption>> {
        if options.is_empty() {
            return Err(CoreError::invalid("at least one option is required"));
        }
        let options = options
            .into_iter()
            .map(validate_option)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut tx = self.store.begin().await?;
        ensure_poll_exists(&mut *tx, poll_id).await?;

        let mut added = Vec::with_capacity(options.len());
        for option in options {
            added.push(insert_option(&mut *tx, poll_id, option).await?);
        }
        tx.commit().await?;

        info!(%poll_id, count = added.len(), "options added");
        Ok(added)
    }

    /// Options in the order they were added.
    pub async fn get_options(&self, poll_id: Uuid) -> CoreResult<Vec<PollOption>> {
        ensure_poll_exists(self.store.pool(), poll_id).await?;

        let options = sqlx::query_as::<_, PollOption>(
            r#"
            SELECT id, poll_id, restaurant_id, name, image_url, menu_url
            FROM poll_options
            WHERE poll_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(poll_id)
        .fetch_all(self.store.pool())
        .await?;

        Ok(options)
    }

    /// A second cast for the same (poll, option, voter) fails with
    /// `DuplicateVote`; the unique index decides, not a prior read.
    pub async fn cast_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        voter: UserId,
    ) -> CoreResult<PollVote> {
        let option_name = self.option_name(poll_id, option_id).await?;

        let vote = PollVote {
            id: Uuid::new_v4(),
            poll_id,
            option_id,
            user_id: voter,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO poll_votes (id, poll_id, option_id, user_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(vote.id)
        .bind(vote.poll_id)
        .bind(vote.option_id)
        .bind(vote.user_id)
        .bind(vote.created_at)
        .execute(self.store.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::DuplicateVote
            } else {
                e.into()
            }
        })?;

        info!(%poll_id, %option_id, %voter, "vote cast");
        self.notifications.voted(voter, &option_name);
        Ok(vote)
    }

    pub async fn remove_vote(&self, poll_id: Uuid, option_id: Uuid, voter: UserId) -> CoreResult<()> {
        self.option_name(poll_id, option_id).await?;

        let result =
            sqlx::query("DELETE FROM poll_votes WHERE poll_id = ? AND option_id = ? AND user_id = ?")
                .bind(poll_id)
                .bind(option_id)
                .bind(voter)
                .execute(self.store.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VoteNotFound);
        }

        info!(%poll_id, %option_id, %voter, "vote removed");
        Ok(())
    }

    /// Every option of the poll with its voters, most votes first. Options
    /// with equal counts keep the order in which they were added.
    pub async fn get_results(&self, poll_id: Uuid) -> CoreResult<Vec<PollResult>> {
        ensure_poll_exists(self.store.pool(), poll_id).await?;

        let options = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, name FROM poll_options WHERE poll_id = ? ORDER BY rowid",
        )
        .bind(poll_id)
        .fetch_all(self.store.pool())
        .await?;

        let votes = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT option_id, user_id
            FROM poll_votes
            WHERE option_id IN (SELECT id FROM poll_options WHERE poll_id = ?)
            ORDER BY rowid
            "#,
        )
        .bind(poll_id)
        .fetch_all(self.store.pool())
        .await?;

        let mut voters: HashMap<Uuid, Vec<UserId>> = HashMap::new();
        for (option_id, user_id) in votes {
            voters.entry(option_id).or_default().push(user_id);
        }

        let mut results: Vec<PollResult> = options
            .into_iter()
            .map(|(option_id, option_name)| {
                let voter_ids = voters.remove(&option_id).unwrap_or_default();
                PollResult {
                    option_id,
                    option_name,
                    vote_count: voter_ids.len() as i64,
                    voter_ids,
                }
            })
            .collect();

        // sort_by is stable, which is what keeps ties in insertion order
        results.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        debug!(%poll_id, options = results.len(), "results computed");
        Ok(results)
    }

    async fn option_name(&self, poll_id: Uuid, option_id: Uuid) -> CoreResult<String> {
        sqlx::query_scalar::<_, String>("SELECT name FROM poll_options WHERE id = ? AND poll_id = ?")
            .bind(option_id)
            .bind(poll_id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(CoreError::OptionNotInPoll)
    }
}

async fn ensure_poll_exists<'e, E>(executor: E, poll_id: Uuid) -> CoreResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar::<_, i64>("SELECT 1 FROM polls WHERE id = ?")
        .bind(poll_id)
        .fetch_optional(executor)
        .await?
        .map(|_| ())
        .ok_or(CoreError::NotFound)
}

async fn insert_option<'e, E>(executor: E, poll_id: Uuid, option: NewOption) -> CoreResult<PollOption>
where
    E: SqliteExecutor<'e>,
{
    let option = PollOption {
        id: Uuid::new_v4(),
        poll_id,
        restaurant_id: option.restaurant_id,
        name: option.name,
        image_url: option.image_url,
        menu_url: option.menu_url,
    };

    sqlx::query(
        r#"
        INSERT INTO poll_options (id, poll_id, restaurant_id, name, image_url, menu_url)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(option.id)
    .bind(option.poll_id)
    .bind(&option.restaurant_id)
    .bind(&option.name)
    .bind(&option.image_url)
    .bind(&option.menu_url)
    .execute(executor)
    .await?;

    Ok(option)
}

fn validate_option(option: NewOption) -> CoreResult<NewOption> {
    let restaurant_id = option.restaurant_id.trim();
    let name = option.name.trim();
    if restaurant_id.is_empty() {
        return Err(CoreError::invalid("restaurant_id is required"));
    }
    if name.is_empty() {
        return Err(CoreError::invalid("option name is required"));
    }

    Ok(NewOption {
        restaurant_id: restaurant_id.to_string(),
        name: name.to_string(),
        image_url: non_blank(option.image_url),
        menu_url: non_blank(option.menu_url),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
