use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool::managed::Object;
use libsql::params;

use super::models::{CheckRow, EventRow};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Durable store for check configurations and their events.
///
/// Every call executes as its own statement-level transaction; inserts
/// return the identity the store assigned.
#[async_trait]
pub trait Store: Send + Sync {
    /// Register a check configuration and return its assigned identity.
    async fn insert_check(&self, kind: &str, config: &serde_json::Value) -> Result<i64>;

    /// Persist one event for a registered check and return the event id.
    async fn insert_event(
        &self,
        timestamp: f64,
        check_id: i64,
        result: &serde_json::Value,
    ) -> Result<i64>;

    /// Fetch a check row by id.
    async fn get_check(&self, id: i64) -> Result<Option<CheckRow>>;

    /// Events persisted for a check, oldest first.
    async fn events_for_check(&self, check_id: i64, limit: usize) -> Result<Vec<EventRow>>;
}

/// libsql-backed store implementation.
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Store for LibsqlStore {
    async fn insert_check(&self, kind: &str, config: &serde_json::Value) -> Result<i64> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "INSERT INTO checks (type, config) VALUES (?, ?) RETURNING id",
                params![kind, serde_json::to_string(config)?],
            )
            .await?;

        let row = rows.next().await?.context("insert into checks returned no row")?;
        Ok(row.get(0)?)
    }

    async fn insert_event(
        &self,
        timestamp: f64,
        check_id: i64,
        result: &serde_json::Value,
    ) -> Result<i64> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "INSERT INTO events (timestamp, check_id, result) VALUES (?, ?, ?) RETURNING id",
                params![timestamp, check_id, serde_json::to_string(result)?],
            )
            .await?;

        let row = rows.next().await?.context("insert into events returned no row")?;
        Ok(row.get(0)?)
    }

    async fn get_check(&self, id: i64) -> Result<Option<CheckRow>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query("SELECT id, type, config FROM checks WHERE id = ?", params![id])
            .await?;

        if let Some(row) = rows.next().await? {
            let config: String = row.get(2)?;
            Ok(Some(CheckRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                config: serde_json::from_str(&config)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn events_for_check(&self, check_id: i64, limit: usize) -> Result<Vec<EventRow>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, timestamp, check_id, result FROM events
                 WHERE check_id = ? ORDER BY id ASC LIMIT ?",
                params![check_id, limit as i64],
            )
            .await?;
        let mut events = Vec::new();

        while let Some(row) = rows.next().await? {
            let result: String = row.get(3)?;
            events.push(EventRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                check_id: row.get(2)?,
                result: serde_json::from_str(&result)?,
            });
        }

        Ok(events)
    }
}
