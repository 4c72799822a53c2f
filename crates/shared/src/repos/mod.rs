use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;

mod adhoc;
mod events;
mod rsvps;
mod users;

pub use adhoc::{SqlParameters, bind_named_parameters};

const EVENT_COLUMNS: &str = "id, title, description, date, time, location, category, \
                             volunteers_needed, contact_email, price, status";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid query parameters: {0}")]
    InvalidParameters(String),
    #[error("storage call timed out")]
    Timeout,
}

/// Bounds a storage call. A timeout drops `call`, so anything it changed on a
/// pooled connection must be undone by the pool, not by code after an await.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

/// SQLite-backed persistence for events, users, RSVPs and volunteer signups.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    pub volunteers_needed: i64,
    pub contact_email: String,
    pub price: Option<f64>,
    pub status: String,
}

impl Event {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Positive price, if any. Zero and missing prices are free.
    pub fn paid_price(&self) -> Option<f64> {
        self.price.filter(|price| *price > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Filter for upcoming active events. `on_or_after` is the organisation-local
/// "today"; `date_from` narrows it further.
#[derive(Debug, Clone)]
pub struct EventSearch {
    pub query: Option<String>,
    pub on_or_after: String,
    pub date_from: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsvpOutcome {
    Created,
    AlreadyExists,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        use std::str::FromStr;

        use sqlx::sqlite::SqliteConnectOptions;

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = Self::pool_options()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Pool settings every store pool needs. Connections are switched back to
    /// writable when they return to the pool, including when an ad-hoc query
    /// was cancelled halfway.
    pub fn pool_options() -> SqlitePoolOptions {
        SqlitePoolOptions::new().after_release(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA query_only = OFF")
                    .execute(&mut *conn)
                    .await?;
                Ok(true)
            })
        })
    }

    /// Wraps an existing pool. Build it from [`Store::pool_options`] so
    /// read-only connections are reset on release.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

fn row_to_event(row: &SqliteRow) -> Result<Event, StoreError> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row
            .try_get::<Option<String>, _>("description")?
            .unwrap_or_default(),
        date: row.try_get("date")?,
        time: row
            .try_get::<Option<String>, _>("time")?
            .unwrap_or_default(),
        location: row
            .try_get::<Option<String>, _>("location")?
            .unwrap_or_default(),
        category: row
            .try_get::<Option<String>, _>("category")?
            .unwrap_or_default(),
        volunteers_needed: row
            .try_get::<Option<i64>, _>("volunteers_needed")?
            .unwrap_or(0),
        contact_email: row
            .try_get::<Option<String>, _>("contact_email")?
            .unwrap_or_default(),
        price: row.try_get("price")?,
        status: row
            .try_get::<Option<String>, _>("status")?
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Escapes LIKE wildcards so user text matches literally (paired with `ESCAPE '\'`).
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
