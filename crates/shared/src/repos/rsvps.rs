use chrono::Utc;

use super::{RsvpOutcome, Store, StoreError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Store {
    /// Creation time of an existing RSVP for the pair, if any.
    pub async fn rsvp_status(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let created_at: Option<Option<String>> = sqlx::query_scalar(
            "SELECT created_at FROM event_rsvps WHERE user_id = ?1 AND event_id = ?2",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(created_at.map(Option::unwrap_or_default))
    }

    /// Inserts the RSVP. The `(user_id, event_id)` unique constraint is the
    /// source of truth for duplicates; a violation is reported as
    /// [`RsvpOutcome::AlreadyExists`].
    pub async fn create_rsvp(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<RsvpOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO event_rsvps (user_id, event_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(user_id)
        .bind(event_id)
        .bind(Utc::now().format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(RsvpOutcome::Created),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(RsvpOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_volunteer_signup(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<RsvpOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO volunteer_signups (user_id, event_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(user_id)
        .bind(event_id)
        .bind(Utc::now().format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(RsvpOutcome::Created),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(RsvpOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }
}
