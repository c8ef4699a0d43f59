//! SQLite archive of every submission.
//!
//! Two tables: `stats` holds one row per submission with a flag per category,
//! `statuses` holds one row per status line, pointing back at its `stats` row.
//! Times are milliseconds since the Unix epoch.

use std::path::Path;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::Submission;
use crate::types::StatusCategory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub id: i64,
    pub name: String,
    pub time: i64,
    pub finished: bool,
    pub inprogress: bool,
    pub impediments: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    pub id: i64,
    pub name: String,
    pub time: i64,
    /// `StatusCategory` index.
    pub state: i64,
    pub status: String,
    /// Owning `stats` row.
    pub stats: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    pub stats: Vec<StatsRow>,
    pub statuses: Vec<StatusRow>,
}

pub struct StatusArchive {
    conn: Connection,
}

impl StatusArchive {
    /// Open (or create) the archive database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let archive = Self { conn };
        archive.migrate()?;
        Ok(archive)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let archive = Self { conn };
        archive.migrate()?;
        Ok(archive)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stats (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                time        DATETIME NOT NULL,
                finished    BOOLEAN NOT NULL,
                inprogress  BOOLEAN NOT NULL,
                impediments BOOLEAN NOT NULL
            );

            CREATE TABLE IF NOT EXISTS statuses (
                id     INTEGER PRIMARY KEY AUTOINCREMENT,
                name   TEXT NOT NULL,
                time   DATETIME NOT NULL,
                state  INTEGER NOT NULL,
                status TEXT NOT NULL,
                stats  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stats_name ON stats(name);
            CREATE INDEX IF NOT EXISTS idx_statuses_name ON statuses(name);
            CREATE INDEX IF NOT EXISTS idx_statuses_stats ON statuses(stats);",
        )?;
        Ok(())
    }

    /// Store `submission`, returning the id of its `stats` row.
    pub fn record(&mut self, submission: &Submission) -> Result<i64> {
        let time = submission.submitted_at.timestamp_millis();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO stats (name, time, finished, inprogress, impediments)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                submission.member,
                time,
                submission.has(StatusCategory::Completed),
                submission.has(StatusCategory::InProgress),
                submission.has(StatusCategory::Impediments),
            ],
        )?;
        let stats_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO statuses (name, time, state, status, stats)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for &category in StatusCategory::all() {
                for line in submission.lines(category) {
                    stmt.execute(params![
                        submission.member,
                        time,
                        category.index(),
                        line,
                        stats_id
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(stats_id)
    }

    /// Every archived row, or only `member`'s when given.
    pub fn history(&self, member: Option<&str>) -> Result<History> {
        let (stats_sql, statuses_sql) = match member {
            Some(_) => (
                "SELECT id, name, time, finished, inprogress, impediments FROM stats
                 WHERE name = ?1 ORDER BY id",
                "SELECT id, name, time, state, status, stats FROM statuses
                 WHERE name = ?1 ORDER BY id",
            ),
            None => (
                "SELECT id, name, time, finished, inprogress, impediments FROM stats ORDER BY id",
                "SELECT id, name, time, state, status, stats FROM statuses ORDER BY id",
            ),
        };

        let mut stmt = self.conn.prepare(stats_sql)?;
        let stats = match member {
            Some(m) => stmt.query_map(params![m], stats_row)?,
            None => stmt.query_map([], stats_row)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(statuses_sql)?;
        let statuses = match member {
            Some(m) => stmt.query_map(params![m], status_row)?,
            None => stmt.query_map([], status_row)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(History { stats, statuses })
    }

    /// Status lines belonging to one submission.
    pub fn statuses_for(&self, stats_id: i64) -> Result<Vec<StatusRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, time, state, status, stats FROM statuses
             WHERE stats = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![stats_id], status_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn stats_row(row: &Row<'_>) -> rusqlite::Result<StatsRow> {
    Ok(StatsRow {
        id: row.get(0)?,
        name: row.get(1)?,
        time: row.get(2)?,
        finished: row.get(3)?,
        inprogress: row.get(4)?,
        impediments: row.get(5)?,
    })
}

fn status_row(row: &Row<'_>) -> rusqlite::Result<StatusRow> {
    Ok(StatusRow {
        id: row.get(0)?,
        name: row.get(1)?,
        time: row.get(2)?,
        state: row.get(3)?,
        status: row.get(4)?,
        stats: row.get(5)?,
    })
}
