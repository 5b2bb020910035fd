//! Postgres persistence for the event journal.
//!
//! Schema: a single append-only `security_events` table indexed for the
//! filter columns. All failures map to `StoreError::Unavailable` so the
//! caller sees one fail-closed store error surface.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;
use tracing::{error, info};

use super::event::{EventFilter, EventType, SecurityEvent};
use crate::error::Result;
use crate::store::StoreError;

pub struct JournalRepository {
    pool: PgPool,
}

fn store_err(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {e}"))
}

impl JournalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the events table and its query index if missing.
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing security_events schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS security_events (
                id VARCHAR(64) PRIMARY KEY,
                event_type VARCHAR(50) NOT NULL,
                ip VARCHAR(64) NOT NULL,
                user_id VARCHAR(255),
                metadata JSONB NOT NULL DEFAULT '{}',
                occurred_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("create security_events table", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_security_events_query \
             ON security_events(event_type, ip, user_id, occurred_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("create security_events index", e))?;

        info!("security_events schema initialized");
        Ok(())
    }

    pub async fn insert_event(&self, event: &SecurityEvent) -> Result<()> {
        let metadata = serde_json::to_value(&event.metadata)
            .unwrap_or_else(|_| serde_json::json!({}));

        sqlx::query(
            r#"
            INSERT INTO security_events (id, event_type, ip, user_id, metadata, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.id)
        .bind(event.event_type.as_str())
        .bind(&event.ip)
        .bind(&event.user_id)
        .bind(metadata)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert security event", e))?;

        Ok(())
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<SecurityEvent>> {
        let row = sqlx::query(
            "SELECT id, event_type, ip, user_id, metadata, occurred_at \
             FROM security_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("get security event", e))?;

        Ok(row.and_then(|r| row_to_event(&r)))
    }

    /// Filtered page, newest first, plus the total matching count.
    pub async fn query_events(
        &self,
        filter: &EventFilter,
        types: Option<&[EventType]>,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<SecurityEvent>, usize)> {
        let (where_sql, binds) = build_conditions(filter, types);

        let count_sql = format!("SELECT COUNT(*) AS total FROM security_events{where_sql}");
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = bind.apply(count_query);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_err("count security events", e))?
            .get("total");

        let select_sql = format!(
            "SELECT id, event_type, ip, user_id, metadata, occurred_at \
             FROM security_events{where_sql} \
             ORDER BY occurred_at DESC \
             LIMIT {page_size} OFFSET {offset}",
            offset = (page - 1) * page_size,
        );
        let mut select_query = sqlx::query(&select_sql);
        for bind in &binds {
            select_query = bind.apply(select_query);
        }
        let rows = select_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_err("query security events", e))?;

        let events = rows.iter().filter_map(row_to_event).collect();
        Ok((events, total as usize))
    }

    /// Delete events older than `cutoff` (or all events when `None`),
    /// optionally restricted to an event-type subset. Returns rows removed.
    pub async fn prune_events(
        &self,
        cutoff: Option<DateTime<Utc>>,
        types: Option<&[EventType]>,
    ) -> Result<u64> {
        let type_names: Option<Vec<String>> =
            types.map(|ts| ts.iter().map(|t| t.as_str().to_string()).collect());

        let result = match (cutoff, type_names) {
            (Some(cutoff), Some(names)) => {
                sqlx::query(
                    "DELETE FROM security_events WHERE occurred_at < $1 AND event_type = ANY($2)",
                )
                .bind(cutoff)
                .bind(names)
                .execute(&self.pool)
                .await
            }
            (Some(cutoff), None) => {
                sqlx::query("DELETE FROM security_events WHERE occurred_at < $1")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            }
            (None, Some(names)) => {
                sqlx::query("DELETE FROM security_events WHERE event_type = ANY($1)")
                    .bind(names)
                    .execute(&self.pool)
                    .await
            }
            (None, None) => sqlx::query("DELETE FROM security_events").execute(&self.pool).await,
        }
        .map_err(|e| store_err("prune security events", e))?;

        Ok(result.rows_affected())
    }

    /// Per-type counts since `since`.
    pub async fn count_by_type(
        &self,
        since: DateTime<Utc>,
        types: Option<&[EventType]>,
    ) -> Result<HashMap<&'static str, u64>> {
        let rows = sqlx::query(
            "SELECT event_type, COUNT(*) AS total FROM security_events \
             WHERE occurred_at >= $1 GROUP BY event_type",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("aggregate security events", e))?;

        let mut counts: HashMap<&'static str, u64> = HashMap::new();
        for t in types.unwrap_or(&EventType::ALL) {
            counts.insert(t.as_str(), 0);
        }
        for row in rows {
            let name: String = row.get("event_type");
            let total: i64 = row.get("total");
            if let Some(t) = EventType::parse(&name) {
                if types.map_or(true, |ts| ts.contains(&t)) {
                    counts.insert(t.as_str(), total as u64);
                }
            }
        }
        Ok(counts)
    }
}

/// One bound condition value, applied in positional order.
enum Bind {
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

impl Bind {
    fn apply<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        match self {
            Bind::Text(v) => query.bind(v),
            Bind::TextArray(v) => query.bind(v),
            Bind::Timestamp(v) => query.bind(*v),
        }
    }
}

fn build_conditions(filter: &EventFilter, types: Option<&[EventType]>) -> (String, Vec<Bind>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(ts) = types {
        binds.push(Bind::TextArray(
            ts.iter().map(|t| t.as_str().to_string()).collect(),
        ));
        conditions.push(format!("event_type = ANY(${})", binds.len()));
    }
    if let Some(t) = filter.event_type {
        binds.push(Bind::Text(t.as_str().to_string()));
        conditions.push(format!("event_type = ${}", binds.len()));
    }
    if let Some(ref ip) = filter.ip {
        binds.push(Bind::Text(ip.clone()));
        conditions.push(format!("ip = ${}", binds.len()));
    }
    if let Some(ref user_id) = filter.user_id {
        binds.push(Bind::Text(user_id.clone()));
        conditions.push(format!("user_id = ${}", binds.len()));
    }
    if let Some(from) = filter.date_from {
        binds.push(Bind::Timestamp(from));
        conditions.push(format!("occurred_at >= ${}", binds.len()));
    }
    if let Some(to) = filter.date_to {
        binds.push(Bind::Timestamp(to));
        conditions.push(format!("occurred_at <= ${}", binds.len()));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Option<SecurityEvent> {
    let type_name: String = row.get("event_type");
    let Some(event_type) = EventType::parse(&type_name) else {
        error!("Unknown event type in journal: {}", type_name);
        return None;
    };
    let metadata_json: serde_json::Value = row.get("metadata");
    let metadata = serde_json::from_value(metadata_json).unwrap_or_default();

    Some(SecurityEvent {
        id: row.get("id"),
        event_type,
        ip: row.get("ip"),
        user_id: row.get("user_id"),
        metadata,
        occurred_at: row.get("occurred_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_conditions_positional_order() {
        let filter = EventFilter {
            event_type: Some(EventType::ShieldFailed),
            ip: Some("203.0.113.5".to_string()),
            ..Default::default()
        };
        let (sql, binds) = build_conditions(&filter, None);
        assert_eq!(sql, " WHERE event_type = $1 AND ip = $2");
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_build_conditions_empty() {
        let (sql, binds) = build_conditions(&EventFilter::default(), None);
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }

    #[test]
    fn test_build_conditions_type_scope_first() {
        let (sql, _) = build_conditions(&EventFilter::default(), Some(&EventType::SHIELD));
        assert_eq!(sql, " WHERE event_type = ANY($1)");
    }
}
