// src/poll.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{is_unique_violation, Store};
use crate::error::{CoreError, CoreResult};
use crate::models::{Poll, PollPatch, PollRow, Role, UserId};
use crate::notification::Notifications;

pub const INVITE_CODE_LEN: usize = 8;
const MAX_INVITE_ATTEMPTS: usize = 5;
const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;

/// Creates polls, admits members and resolves each caller's role.
#[derive(Clone)]
pub struct PollService {
    store: Store,
    notifications: Notifications,
}

impl PollService {
    pub fn new(store: Store, notifications: Notifications) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn create_poll(&self, name: &str, creator: UserId) -> CoreResult<Poll> {
        let name = validate_name(name)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let invite_code =
            insert_poll(&mut tx, id, &name, creator, now, generate_invite_code).await?;

        sqlx::query("INSERT INTO polls_members (poll_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(creator)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(poll_id = %id, %creator, "poll created");
        self.notifications.poll_created(creator, &name);

        Ok(Poll {
            id,
            name,
            invite_code,
            role: Some(Role::Owner),
            members: vec![creator],
            created_by: creator,
            created_at: now,
            updated_at: now,
        })
    }

    /// Joining twice is an error, never a no-op.
    pub async fn join_poll(&self, invite_code: &str, caller: UserId) -> CoreResult<Poll> {
        validate_invite_code(invite_code)?;

        let row = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT id, name, invite_code, created_by, created_at, updated_at, NULL AS role
            FROM polls
            WHERE invite_code = ?
            "#,
        )
        .bind(invite_code)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or(CoreError::InvalidInviteCode)?;

        if row.created_by == caller {
            return Err(CoreError::AlreadyMember);
        }

        sqlx::query("INSERT INTO polls_members (poll_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(row.id)
            .bind(caller)
            .bind(Utc::now())
            .execute(self.store.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::AlreadyMember
                } else {
                    e.into()
                }
            })?;

        info!(poll_id = %row.id, user_id = %caller, "member joined poll");
        self.notifications.poll_joined(caller, &row.name);
        self.notifications.member_joined(row.created_by, &row.name);

        let members = self.members(row.id).await?;
        let mut poll = row.into_poll(members);
        poll.role = Some(Role::Member);
        Ok(poll)
    }

    /// Callers with no relationship to the poll get `NotFound`, exactly as if
    /// the poll did not exist.
    pub async fn get_poll(&self, poll_id: Uuid, caller: UserId) -> CoreResult<Poll> {
        let row = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT p.id, p.name, p.invite_code, p.created_by, p.created_at, p.updated_at,
                CASE
                    WHEN p.created_by = ? THEN 'owner'
                    WHEN EXISTS (
                        SELECT 1 FROM polls_members pm WHERE pm.poll_id = p.id AND pm.user_id = ?
                    ) THEN 'member'
                    ELSE NULL
                END AS role
            FROM polls p
            WHERE p.id = ?
            "#,
        )
        .bind(caller)
        .bind(caller)
        .bind(poll_id)
        .fetch_optional(self.store.pool())
        .await?
        .filter(|row| row.role.is_some())
        .ok_or(CoreError::NotFound)?;

        let members = self.members(poll_id).await?;
        debug!(%poll_id, %caller, "poll fetched");
        Ok(row.into_poll(members))
    }

    pub async fn get_polls(&self, caller: UserId) -> CoreResult<Vec<Poll>> {
        let rows = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT p.id, p.name, p.invite_code, p.created_by, p.created_at, p.updated_at,
                CASE WHEN p.created_by = ? THEN 'owner' ELSE 'member' END AS role
            FROM polls p
            WHERE p.created_by = ?
                OR EXISTS (
                    SELECT 1 FROM polls_members pm WHERE pm.poll_id = p.id AND pm.user_id = ?
                )
            ORDER BY p.created_at, p.rowid
            "#,
        )
        .bind(caller)
        .bind(caller)
        .bind(caller)
        .fetch_all(self.store.pool())
        .await?;

        let member_rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT pm.poll_id, pm.user_id
            FROM polls_members pm
            WHERE pm.poll_id IN (
                SELECT p.id FROM polls p
                WHERE p.created_by = ?
                    OR EXISTS (
                        SELECT 1 FROM polls_members mine
                        WHERE mine.poll_id = p.id AND mine.user_id = ?
                    )
            )
            ORDER BY pm.rowid
            "#,
        )
        .bind(caller)
        .bind(caller)
        .fetch_all(self.store.pool())
        .await?;

        let mut members: HashMap<Uuid, Vec<UserId>> = HashMap::new();
        for (poll_id, user_id) in member_rows {
            members.entry(poll_id).or_default().push(user_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let poll_members = members.remove(&row.id).unwrap_or_default();
                row.into_poll(poll_members)
            })
            .collect())
    }

    /// Applies only the provided, non-empty fields. The returned poll carries
    /// no caller role.
    pub async fn update_poll(&self, poll_id: Uuid, patch: PollPatch) -> CoreResult<Poll> {
        let name = patch
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(CoreError::NoFieldsProvided)?;
        let name = validate_name(&name)?;

        let result = sqlx::query("UPDATE polls SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(Utc::now())
            .bind(poll_id)
            .execute(self.store.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }

        let row = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT id, name, invite_code, created_by, created_at, updated_at, NULL AS role
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or(CoreError::NotFound)?;

        info!(%poll_id, "poll updated");
        let members = self.members(poll_id).await?;
        Ok(row.into_poll(members))
    }

    /// Removes votes, options, memberships and the poll itself in one
    /// transaction. Either all four go or none do.
    pub async fn delete_poll(&self, poll_id: Uuid) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;

        match delete_poll_rows(&mut tx, poll_id).await {
            Ok(()) => {
                tx.commit().await?;
                info!(%poll_id, "poll deleted");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(%poll_id, error = %rollback_err, "failed to rollback transaction");
                }
                Err(e)
            }
        }
    }

    async fn members(&self, poll_id: Uuid) -> CoreResult<Vec<UserId>> {
        let members = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM polls_members WHERE poll_id = ? ORDER BY rowid",
        )
        .bind(poll_id)
        .fetch_all(self.store.pool())
        .await?;

        Ok(members)
    }
}

/// Inserts the poll row, drawing a fresh invite code from `next_code` each
/// time the unique index rejects one.
async fn insert_poll(
    tx: &mut Transaction<'static, Sqlite>,
    id: Uuid,
    name: &str,
    creator: UserId,
    now: DateTime<Utc>,
    mut next_code: impl FnMut() -> String,
) -> CoreResult<String> {
    let mut attempts = 0;
    loop {
        let code = next_code();
        let inserted = sqlx::query(
            r#"
            INSERT INTO polls (id, name, invite_code, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(&code)
        .bind(creator)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => return Ok(code),
            Err(e) if is_unique_violation(&e) && attempts + 1 < MAX_INVITE_ATTEMPTS => {
                attempts += 1;
                warn!(attempts, "invite code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn delete_poll_rows(tx: &mut Transaction<'static, Sqlite>, poll_id: Uuid) -> CoreResult<()> {
    sqlx::query(
        r#"
        DELETE FROM poll_votes
        WHERE poll_id = ?
            OR option_id IN (SELECT id FROM poll_options WHERE poll_id = ?)
        "#,
    )
    .bind(poll_id)
    .bind(poll_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM poll_options WHERE poll_id = ?")
        .bind(poll_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("DELETE FROM polls_members WHERE poll_id = ?")
        .bind(poll_id)
        .execute(&mut **tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM polls WHERE id = ?")
        .bind(poll_id)
        .execute(&mut **tx)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(CoreError::NotFound);
    }
    Ok(())
}

fn generate_invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect()
}

fn validate_invite_code(code: &str) -> CoreResult<()> {
    if code.len() != INVITE_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::invalid(format!(
            "invite code must be {INVITE_CODE_LEN} alphanumeric characters"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(CoreError::invalid(format!(
            "poll name must be between {NAME_MIN} and {NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_taken_code(code: &'static str) -> (Store, Transaction<'static, Sqlite>) {
        let store = Store::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        insert_poll(&mut tx, Uuid::new_v4(), "First", Uuid::new_v4(), Utc::now(), || {
            code.to_string()
        })
        .await
        .unwrap();
        (store, tx)
    }

    #[tokio::test]
    async fn invite_code_collision_draws_a_new_code() {
        let (_store, mut tx) = store_with_taken_code("TAKEN123").await;

        let mut codes = vec!["FRESH456", "TAKEN123"];
        let mut calls = 0;
        let code = insert_poll(&mut tx, Uuid::new_v4(), "Second", Uuid::new_v4(), Utc::now(), || {
            calls += 1;
            codes.pop().unwrap().to_string()
        })
        .await
        .unwrap();

        assert_eq!(code, "FRESH456");
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn invite_code_retries_are_bounded() {
        let (_store, mut tx) = store_with_taken_code("TAKEN123").await;

        let mut calls = 0;
        let err = insert_poll(&mut tx, Uuid::new_v4(), "Second", Uuid::new_v4(), Utc::now(), || {
            calls += 1;
            "TAKEN123".to_string()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(calls, MAX_INVITE_ATTEMPTS);
    }

    #[test]
    fn invite_codes_are_fixed_length_alphanumeric() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(validate_invite_code(&code).is_ok());
        assert_ne!(code, generate_invite_code());
    }

    #[test]
    fn invite_code_shape_is_checked() {
        assert!(validate_invite_code("XK7QPLMZ").is_ok());
        assert!(matches!(
            validate_invite_code("XK7QPLM"),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_invite_code("XK7QPLM!"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn poll_names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Friday lunch ").unwrap(), "Friday lunch");
        assert!(validate_name("x").is_err());
        assert!(validate_name(&"y".repeat(NAME_MAX + 1)).is_err());
    }
}
