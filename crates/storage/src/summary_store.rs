//! Append-only storage of conversation summaries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docchat_core::{ConversationSummary, SavedSummary, SummaryStore};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::ident;

/// A [`SummaryStore`] backed by a SQLite table.
///
/// The table is created on first use. A trigger rejects every `UPDATE`,
/// so a saved summary can never change.
#[derive(Clone, Debug)]
pub struct SqliteSummaryStore {
    db: Arc<Database>,
    table: Arc<str>,
}

impl SqliteSummaryStore {
    /// Opens the store kept in `table`, creating the table if needed.
    pub fn new(db: Arc<Database>, table: &str) -> Result<Self> {
        let quoted = ident::quoted(table)?;
        db.with_conn(|conn| create_table(conn, table, &quoted))?;
        Ok(Self {
            db,
            table: quoted.into(),
        })
    }

    /// Returns all saved summaries, oldest first.
    pub async fn list(&self) -> Result<Vec<SavedSummary>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.list_blocking()).await?
    }

    fn save_blocking(
        &self,
        summary: &ConversationSummary,
    ) -> Result<SavedSummary> {
        let saved = SavedSummary {
            id: Uuid::new_v4(),
            title: summary.title.clone(),
            summary: summary.summary.clone(),
            created_at: Utc::now(),
        };
        let sql = format!(
            "INSERT INTO {} (id, title, summary, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        self.db.with_conn(|conn| {
            conn.execute(&sql, params![
                saved.id.to_string(),
                saved.title,
                saved.summary,
                saved.created_at.to_rfc3339(),
            ])?;
            Ok(())
        })?;
        debug!("inserted summary {} into {}", saved.id, self.table);
        Ok(saved)
    }

    fn list_blocking(&self) -> Result<Vec<SavedSummary>> {
        let sql = format!(
            "SELECT id, title, summary, created_at FROM {}
             ORDER BY created_at, rowid",
            self.table
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], read_row)?;
            let mut summaries = vec![];
            for row in rows {
                summaries.push(decode_row(row?)?);
            }
            Ok(summaries)
        })
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn save(
        &self,
        summary: &ConversationSummary,
    ) -> docchat_core::Result<SavedSummary> {
        let this = self.clone();
        let summary = summary.clone();
        let saved = tokio::task::spawn_blocking(move || {
            this.save_blocking(&summary)
        })
        .await
        .map_err(Error::from)??;
        Ok(saved)
    }
}

fn create_table(conn: &Connection, table: &str, quoted: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (
            id          TEXT PRIMARY KEY NOT NULL,
            title       TEXT NOT NULL,
            summary     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TRIGGER IF NOT EXISTS \"{table}_immutable\"
            BEFORE UPDATE ON {quoted}
        BEGIN
            SELECT RAISE(ABORT, 'saved summaries are immutable');
        END;"
    ))?;
    Ok(())
}

type RawRow = (String, String, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row(
    (id, title, summary, created_at): RawRow,
) -> Result<SavedSummary> {
    let id = Uuid::parse_str(&id)
        .map_err(|err| Error::InvalidRow(format!("bad id {id:?}: {err}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| {
            Error::InvalidRow(format!("bad timestamp {created_at:?}: {err}"))
        })?
        .with_timezone(&Utc);
    Ok(SavedSummary {
        id,
        title,
        summary,
        created_at,
    })
}
