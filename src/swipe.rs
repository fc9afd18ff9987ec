// src/swipe.rs
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::models::{MutualLike, Swipe, UserId};

/// Records like/dislike signals for a match and finds the restaurants both
/// participants liked.
#[derive(Clone)]
pub struct SwipeRecorder {
    store: Store,
}

impl SwipeRecorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append-only: repeated swipes on the same restaurant all persist.
    pub async fn submit_swipe(
        &self,
        match_id: Uuid,
        user_id: UserId,
        restaurant_id: &str,
        restaurant_name: &str,
        liked: bool,
    ) -> CoreResult<Swipe> {
        let restaurant_id = restaurant_id.trim();
        let restaurant_name = restaurant_name.trim();
        if restaurant_id.is_empty() || restaurant_name.is_empty() {
            return Err(CoreError::invalid("restaurant_id and restaurant_name are required"));
        }

        let swipe = Swipe {
            id: Uuid::new_v4(),
            match_id,
            user_id,
            restaurant_id: restaurant_id.to_string(),
            restaurant_name: restaurant_name.to_string(),
            liked,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO head2head_swipes
                (id, match_id, user_id, restaurant_id, restaurant_name, liked, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(swipe.id)
        .bind(swipe.match_id)
        .bind(swipe.user_id)
        .bind(&swipe.restaurant_id)
        .bind(&swipe.restaurant_name)
        .bind(swipe.liked)
        .bind(swipe.created_at)
        .execute(self.store.pool())
        .await?;

        info!(%match_id, %user_id, restaurant = %swipe.restaurant_id, liked, "swipe recorded");
        Ok(swipe)
    }

    /// Restaurants liked by both participants, once each. Grouping by
    /// restaurant and demanding two distinct likers works because a match has
    /// exactly two participants; swipes from anyone else are ignored.
    pub async fn get_mutual_likes(&self, match_id: Uuid) -> CoreResult<Vec<MutualLike>> {
        let likes = sqlx::query_as::<_, MutualLike>(
            r#"
            SELECT s.restaurant_id, MIN(s.restaurant_name) AS restaurant_name
            FROM head2head_swipes s
            JOIN head2head_matches m ON m.id = s.match_id
            WHERE s.match_id = ?
                AND s.liked = 1
                AND s.user_id IN (m.inviter_id, m.invitee_id)
            GROUP BY s.restaurant_id
            HAVING COUNT(DISTINCT s.user_id) = 2
            ORDER BY MIN(s.rowid)
            "#,
        )
        .bind(match_id)
        .fetch_all(self.store.pool())
        .await?;

        debug!(%match_id, count = likes.len(), "mutual likes computed");
        Ok(likes)
    }
}
