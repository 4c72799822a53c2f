use sqlx::QueryBuilder;
use sqlx::Sqlite;

use super::{EVENT_COLUMNS, Event, EventSearch, Store, StoreError, like_pattern, row_to_event};

const VOLUNTEER_OPPORTUNITIES_LIMIT: i64 = 10;

impl Store {
    /// Active events dated on or after `search.on_or_after`, soonest first.
    pub async fn search_events(&self, search: &EventSearch) -> Result<Vec<Event>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE status = 'active' AND date >= "
        ));
        builder.push_bind(search.on_or_after.clone());

        if let Some(date_from) = search
            .date_from
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            builder.push(" AND date >= ");
            builder.push_bind(date_from.to_string());
        }

        if let Some(query) = search
            .query
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let pattern = like_pattern(query);
            builder.push(" AND (title LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR description LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR category LIKE ");
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\')");
        }

        builder.push(" ORDER BY date ASC, time ASC LIMIT ");
        builder.push_bind(i64::from(search.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    /// First active event whose title contains `title`, case-insensitively.
    pub async fn event_by_title(&self, title: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM events
             WHERE LOWER(title) LIKE LOWER(?1) ESCAPE '\\' AND status = 'active'
             ORDER BY date ASC
             LIMIT 1"
        ))
        .bind(like_pattern(title.trim()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    /// Any event by id, regardless of status.
    pub async fn event_by_id(&self, event_id: i64) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    pub async fn volunteer_opportunities(
        &self,
        on_or_after: &str,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM events
             WHERE date >= ?1 AND volunteers_needed > 0 AND status = 'active'
             ORDER BY date ASC, time ASC
             LIMIT ?2"
        ))
        .bind(on_or_after)
        .bind(VOLUNTEER_OPPORTUNITIES_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}
