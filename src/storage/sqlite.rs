//! SQLite database layer

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ExperimentFilter, ExperimentStore, ExperimentUpdate, migrations};
use crate::core::{
    DecisionLog, Experiment, ExperimentEvent, FeedbackSignal, FlagMap, UserAssignment,
};
use crate::error::{Result, XpError};

/// SQLite-backed [`ExperimentStore`].
///
/// Experiments are stored as JSON documents with the queried fields
/// (`status`, `application_id`) mirrored into indexed columns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    schema_version: u32,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    /// Current schema version after migrations.
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| XpError::Serialization(format!("timestamp {raw}: {err}")))
}

/// Store a unit enum as its serde name.
fn enum_to_sql<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(name) => Ok(name),
        other => Err(XpError::Serialization(format!(
            "expected string enum, got {other}"
        ))),
    }
}

fn enum_from_sql<T: DeserializeOwned>(raw: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(raw))?)
}

fn experiment_from_row(row: &Row<'_>) -> Result<Experiment> {
    let body: String = row.get(0)?;
    Ok(serde_json::from_str(&body)?)
}

fn assignment_from_row(row: &Row<'_>) -> Result<UserAssignment> {
    let assigned_at: String = row.get(3)?;
    Ok(UserAssignment {
        experiment_id: row.get(0)?,
        user_id: row.get(1)?,
        variant_id: row.get(2)?,
        assigned_at: parse_ts(&assigned_at)?,
    })
}

fn event_from_row(row: &Row<'_>) -> Result<ExperimentEvent> {
    let timestamp: String = row.get(6)?;
    Ok(ExperimentEvent {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        user_id: row.get(2)?,
        variant_id: row.get(3)?,
        metric_id: row.get(4)?,
        value: row.get(5)?,
        timestamp: parse_ts(&timestamp)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> Result<FeedbackSignal> {
    let timestamp: String = row.get(8)?;
    Ok(FeedbackSignal {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        variant_id: row.get(2)?,
        user_id: row.get(3)?,
        feedback_type: enum_from_sql(row.get(4)?)?,
        sentiment: enum_from_sql(row.get(5)?)?,
        score: row.get(6)?,
        message: row.get(7)?,
        timestamp: parse_ts(&timestamp)?,
    })
}

fn decision_from_row(row: &Row<'_>) -> Result<DecisionLog> {
    let evaluation_json: Option<String> = row.get(5)?;
    let timestamp: String = row.get(6)?;
    Ok(DecisionLog {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        action: enum_from_sql(row.get(2)?)?,
        reason: row.get(3)?,
        actor: enum_from_sql(row.get(4)?)?,
        evaluation: evaluation_json
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        timestamp: parse_ts(&timestamp)?,
    })
}

const EVENT_COLUMNS: &str =
    "id, experiment_id, user_id, variant_id, metric_id, value, timestamp";

fn insert_event(conn: &Connection, event: &ExperimentEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO experiment_events (
            id, experiment_id, user_id, variant_id, metric_id, value, timestamp
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            event.id,
            event.experiment_id,
            event.user_id,
            event.variant_id,
            event.metric_id,
            event.value,
            ts(event.timestamp),
        ],
    )?;
    Ok(())
}

impl ExperimentStore for SqliteStore {
    fn create_experiment(&self, experiment: &Experiment) -> Result<()> {
        let body = serde_json::to_string(experiment)?;
        let now = ts(Utc::now());
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO experiments (
                id, application_id, status, body_json, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                experiment.id,
                experiment.application_id,
                experiment.status.as_str(),
                body,
                now,
                now,
            ],
        )?;
        if inserted == 0 {
            return Err(XpError::ValidationFailed(format!(
                "experiment already exists: {}",
                experiment.id
            )));
        }
        Ok(())
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<Option<Experiment>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body_json FROM experiments WHERE id = ?",
                [experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| serde_json::from_str(&body).map_err(XpError::from))
            .transpose()
    }

    fn update_experiment(
        &self,
        experiment_id: &str,
        update: &ExperimentUpdate,
    ) -> Result<Experiment> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body_json FROM experiments WHERE id = ?",
                [experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Err(XpError::ExperimentNotFound(experiment_id.to_string()));
        };

        let mut experiment: Experiment = serde_json::from_str(&body)?;
        update.apply(&mut experiment);
        tx.execute(
            "UPDATE experiments SET status = ?, body_json = ?, updated_at = ? WHERE id = ?",
            params![
                experiment.status.as_str(),
                serde_json::to_string(&experiment)?,
                ts(Utc::now()),
                experiment_id,
            ],
        )?;
        tx.commit()?;
        Ok(experiment)
    }

    fn list_experiments(&self, filter: &ExperimentFilter) -> Result<Vec<Experiment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body_json FROM experiments
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR application_id = ?2)
             ORDER BY created_at ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![
            filter.status.map(|status| status.as_str()),
            filter.application_id,
        ])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(experiment_from_row(row)?);
        }
        Ok(records)
    }

    fn get_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<Option<UserAssignment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, user_id, variant_id, assigned_at
             FROM user_assignments WHERE experiment_id = ? AND user_id = ?",
        )?;
        let mut rows = stmt.query([experiment_id, user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(assignment_from_row(row)?));
        }
        Ok(None)
    }

    fn set_assignment(&self, assignment: &UserAssignment) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO user_assignments (experiment_id, user_id, variant_id, assigned_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(experiment_id, user_id) DO UPDATE SET
                variant_id = excluded.variant_id,
                assigned_at = excluded.assigned_at",
            params![
                assignment.experiment_id,
                assignment.user_id,
                assignment.variant_id,
                ts(assignment.assigned_at),
            ],
        )?;
        Ok(())
    }

    fn get_assignments_by_user(&self, user_id: &str) -> Result<Vec<UserAssignment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, user_id, variant_id, assigned_at
             FROM user_assignments WHERE user_id = ? ORDER BY experiment_id",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(assignment_from_row(row)?);
        }
        Ok(records)
    }

    fn clear_assignments(&self, experiment_id: &str) -> Result<usize> {
        Ok(self.conn.lock().execute(
            "DELETE FROM user_assignments WHERE experiment_id = ?",
            [experiment_id],
        )?)
    }

    fn add_event(&self, event: &ExperimentEvent) -> Result<()> {
        insert_event(&self.conn.lock(), event)
    }

    fn add_events(&self, events: &[ExperimentEvent]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for event in events {
            insert_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_events(
        &self,
        experiment_id: &str,
        metric_id: Option<&str>,
    ) -> Result<Vec<ExperimentEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM experiment_events
             WHERE experiment_id = ?1 AND (?2 IS NULL OR metric_id = ?2)
             ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let mut rows = stmt.query(params![experiment_id, metric_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(event_from_row(row)?);
        }
        Ok(records)
    }

    fn get_events_by_variant(
        &self,
        experiment_id: &str,
        variant_id: &str,
    ) -> Result<Vec<ExperimentEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM experiment_events
             WHERE experiment_id = ? AND variant_id = ?
             ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let mut rows = stmt.query([experiment_id, variant_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(event_from_row(row)?);
        }
        Ok(records)
    }

    fn add_feedback(&self, signal: &FeedbackSignal) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO feedback_signals (
                id, experiment_id, variant_id, user_id, feedback_type, sentiment,
                score, message, timestamp
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                signal.id,
                signal.experiment_id,
                signal.variant_id,
                signal.user_id,
                enum_to_sql(&signal.feedback_type)?,
                enum_to_sql(&signal.sentiment)?,
                signal.score,
                signal.message,
                ts(signal.timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_feedback(
        &self,
        experiment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackSignal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, experiment_id, variant_id, user_id, feedback_type, sentiment,
                    score, message, timestamp
             FROM feedback_signals
             WHERE experiment_id = ?1 AND (?2 IS NULL OR timestamp >= ?2)
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let mut rows = stmt.query(params![experiment_id, since.map(ts)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(feedback_from_row(row)?);
        }
        Ok(records)
    }

    fn add_decision_log(&self, entry: &DecisionLog) -> Result<()> {
        let evaluation_json = entry
            .evaluation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.lock().execute(
            "INSERT INTO decision_logs (
                id, experiment_id, action, reason, actor, evaluation_json, timestamp
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id,
                entry.experiment_id,
                entry.action.as_str(),
                entry.reason,
                entry.actor.as_str(),
                evaluation_json,
                ts(entry.timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_decision_logs(&self, experiment_id: &str) -> Result<Vec<DecisionLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, experiment_id, action, reason, actor, evaluation_json, timestamp
             FROM decision_logs WHERE experiment_id = ?
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let mut rows = stmt.query([experiment_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(decision_from_row(row)?);
        }
        Ok(records)
    }

    fn get_user_segments(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT segment FROM user_segments WHERE user_id = ? ORDER BY segment")?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    fn set_user_segments(&self, user_id: &str, segments: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM user_segments WHERE user_id = ?", [user_id])?;
        for segment in segments {
            tx.execute(
                "INSERT OR IGNORE INTO user_segments (user_id, segment) VALUES (?, ?)",
                [user_id, segment.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn set_feature_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()> {
        let now = ts(Utc::now());
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in flags {
            tx.execute(
                "INSERT INTO feature_flags (application_id, flag_key, value_json, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(application_id, flag_key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at",
                params![application_id, key, serde_json::to_string(value)?, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_feature_flags(&self, application_id: &str) -> Result<FlagMap> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT flag_key, value_json FROM feature_flags WHERE application_id = ?",
        )?;
        let mut rows = stmt.query([application_id])?;
        let mut flags = FlagMap::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            flags.insert(key, serde_json::from_str(&value)?);
        }
        Ok(flags)
    }
}
