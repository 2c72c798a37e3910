//! SQLite persistence for patients, sessions, documents and measurements.
//!
//! [`Database`] is a cloneable handle around one connection. Every method
//! locks the connection for the duration of one statement or transaction,
//! so a flush from the controller never interleaves with another write.
//!
//! Timestamps are stored as RFC 3339 text with nanosecond precision and a
//! `Z` suffix, which keeps lexicographic order equal to time order.

pub mod migrations;
pub mod models;

pub use models::{generate_unique_id, AnnotatedEvent, Document, Patient, Session};

use crate::backend::packet::Table;
use crate::backend::store::MeasurementSink;
use crate::error::{CranioError, Result};
use crate::types::{DistractorInfo, DistractorType, EventId, EventType, SensorInfo, Timestamp};
use chrono::{DateTime, SecondsFormat, Utc};
use migrations::run_migrations;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn format_datetime(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(value: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| CranioError::Serialization(format!("invalid datetime '{}': {}", value, err)))
}

type DocumentRow = (
    String,
    String,
    String,
    u32,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<f64>,
);

const DOCUMENT_COLUMNS: &str = "document_id, session_id, patient_id, distractor_number, \
     distractor_type, operator, started_at, sensor_serial_number, notes, full_turn_count";

fn document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn document_from_row(row: DocumentRow) -> Result<Document> {
    let (
        document_id,
        session_id,
        patient_id,
        distractor_number,
        distractor_type,
        operator,
        started_at,
        sensor_serial_number,
        notes,
        full_turn_count,
    ) = row;
    Ok(Document {
        document_id,
        session_id,
        patient_id,
        distractor_number,
        distractor_type: DistractorType::from(distractor_type),
        operator,
        started_at: parse_datetime(&started_at)?,
        sensor_serial_number,
        notes,
        full_turn_count,
    })
}

/// Handle to the application database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<Arc<PathBuf>>,
}

impl Database {
    /// Open (or create) a database file and migrate it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::error!("Failed to enable WAL mode: {}", err);
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&mut conn)?;

        tracing::info!("Database initialized at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(Arc::new(path)),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Acquire the connection lock, returning an error if the lock is poisoned
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CranioError::Channel(format!("Database lock poisoned: {}", e)))
    }

    // ==================== Patients ====================

    pub fn insert_patient(&self, patient: &Patient) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO patients (patient_id, created_at) VALUES (?1, ?2)",
            params![patient.patient_id, format_datetime(&patient.created_at)],
        )?;
        tracing::info!("Inserted patient {}", patient.patient_id);
        Ok(())
    }

    pub fn patient_exists(&self, patient_id: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM patients WHERE patient_id = ?1",
                params![patient_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All patient ids, sorted
    pub fn list_patients(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT patient_id FROM patients ORDER BY patient_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    /// Patient of the most recent document in the most recently started session
    pub fn most_recently_used_patient(&self) -> Result<Option<String>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT d.patient_id FROM documents d
                 JOIN sessions s ON d.session_id = s.session_id
                 ORDER BY s.started_at DESC, d.started_at DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ==================== Sessions ====================

    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sessions (session_id, started_at) VALUES (?1, ?2)",
            params![session.session_id, format_datetime(&session.started_at)],
        )?;
        tracing::info!("Inserted session {}", session.session_id);
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT session_id, started_at FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(session_id, started_at)| {
            Ok(Session {
                session_id,
                started_at: parse_datetime(&started_at)?,
            })
        })
        .transpose()
    }

    /// All sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT session_id, started_at FROM sessions ORDER BY started_at DESC",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter()
            .map(|(session_id, started_at)| {
                Ok(Session {
                    session_id,
                    started_at: parse_datetime(&started_at)?,
                })
            })
            .collect()
    }

    // ==================== Sensor and distractor info ====================

    pub fn upsert_sensor_info(&self, info: &SensorInfo) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sensor_info (sensor_serial_number, turns_in_full_turn) VALUES (?1, ?2)
             ON CONFLICT(sensor_serial_number) DO UPDATE SET turns_in_full_turn = excluded.turns_in_full_turn",
            params![info.sensor_serial_number, info.turns_in_full_turn],
        )?;
        Ok(())
    }

    pub fn get_sensor_info(&self, serial_number: &str) -> Result<Option<SensorInfo>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT sensor_serial_number, turns_in_full_turn FROM sensor_info
                 WHERE sensor_serial_number = ?1",
                params![serial_number],
                |row| {
                    Ok(SensorInfo {
                        sensor_serial_number: row.get(0)?,
                        turns_in_full_turn: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn upsert_distractor_info(&self, info: &DistractorInfo) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO distractor_info (distractor_type, displacement_mm_per_full_turn) VALUES (?1, ?2)
             ON CONFLICT(distractor_type) DO UPDATE SET displacement_mm_per_full_turn = excluded.displacement_mm_per_full_turn",
            params![info.distractor_type.as_str(), info.displacement_mm_per_full_turn],
        )?;
        Ok(())
    }

    pub fn get_distractor_info(
        &self,
        distractor_type: &DistractorType,
    ) -> Result<Option<DistractorInfo>> {
        let row: Option<(String, f64)> = self
            .conn()?
            .query_row(
                "SELECT distractor_type, displacement_mm_per_full_turn FROM distractor_info
                 WHERE distractor_type = ?1",
                params![distractor_type.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(name, displacement)| DistractorInfo::new(DistractorType::from(name), displacement)))
    }

    // ==================== Documents ====================

    pub fn insert_document(&self, document: &Document) -> Result<()> {
        self.conn()?.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                DOCUMENT_COLUMNS
            ),
            params![
                document.document_id,
                document.session_id,
                document.patient_id,
                document.distractor_number,
                document.distractor_type.as_str(),
                document.operator,
                format_datetime(&document.started_at),
                document.sensor_serial_number,
                document.notes,
                document.full_turn_count,
            ],
        )?;
        tracing::info!("Inserted document {}", document.document_id);
        Ok(())
    }

    /// Write the notes and full turn count of an existing document
    pub fn update_document(&self, document: &Document) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE documents SET notes = ?2, full_turn_count = ?3 WHERE document_id = ?1",
            params![document.document_id, document.notes, document.full_turn_count],
        )?;
        if changed == 0 {
            return Err(CranioError::NotFound(format!(
                "document {}",
                document.document_id
            )));
        }
        Ok(())
    }

    pub fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM documents WHERE document_id = ?1", DOCUMENT_COLUMNS),
                params![document_id],
                document_row,
            )
            .optional()?;
        row.map(document_from_row).transpose()
    }

    /// Documents of a session in recording order
    pub fn documents_for_session(&self, session_id: &str) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM documents WHERE session_id = ?1 ORDER BY started_at",
                DOCUMENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![session_id], document_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(document_from_row).collect()
    }

    // ==================== Measurements ====================

    /// Append every cell of a table as a measurement row, in one transaction
    ///
    /// `time_s` is measured from `started_at`. Returns the number of rows.
    pub fn insert_measurements(
        &self,
        document_id: &str,
        started_at: &Timestamp,
        table: &Table,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO measurements (document_id, recorded_at, time_s, channel, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (timestamp, row) in table.iter_rows() {
                let recorded_at = format_datetime(timestamp);
                let time_s = seconds_between(started_at, timestamp);
                for (channel, value) in table.columns.iter().zip(row) {
                    stmt.execute(params![document_id, recorded_at, time_s, channel, value])?;
                    inserted += 1;
                }
            }
        }
        tx.commit()?;
        tracing::debug!("Inserted {} measurements for {}", inserted, document_id);
        Ok(inserted)
    }

    /// `(time_s, value)` pairs of one channel, skipping missing samples
    pub fn related_time_series(&self, document_id: &str, channel: &str) -> Result<Vec<(f64, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT time_s, value FROM measurements
             WHERE document_id = ?1 AND channel = ?2 AND value IS NOT NULL
             ORDER BY time_s, measurement_id",
        )?;
        let rows = stmt.query_map(params![document_id, channel], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Number of measurement rows of a document
    pub fn measurement_count(&self, document_id: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM measurements WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ==================== Annotated events ====================

    /// Insert or replace annotated events in one transaction
    pub fn insert_annotated_events(&self, events: &[AnnotatedEvent]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO annotated_events
                 (document_id, event_type, event_num, region_begin, region_end, annotation_done, recorded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.document_id,
                    event.event.event_type.code().to_string(),
                    event.event.num,
                    event.region_begin,
                    event.region_end,
                    event.annotation_done,
                    event.recorded,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Annotated events of a document ordered by event number
    pub fn related_events(&self, document_id: &str) -> Result<Vec<AnnotatedEvent>> {
        type EventRow = (String, String, u32, f64, f64, bool, bool);
        let rows: Vec<EventRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT document_id, event_type, event_num, region_begin, region_end,
                        annotation_done, recorded
                 FROM annotated_events WHERE document_id = ?1
                 ORDER BY event_type, event_num",
            )?;
            let rows = stmt.query_map(params![document_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter()
            .map(
                |(document_id, event_type, num, region_begin, region_end, annotation_done, recorded)| {
                    Ok(AnnotatedEvent {
                        document_id,
                        event: EventId::new(EventType::from_code(&event_type)?, num)?,
                        region_begin,
                        region_end,
                        annotation_done,
                        recorded,
                    })
                },
            )
            .collect()
    }
}

fn seconds_between(start: &Timestamp, at: &Timestamp) -> f64 {
    let delta = *at - *start;
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1e3)
}

/// Sink writing flushed tables as measurements of one document
pub struct DocumentSink {
    database: Database,
    document_id: String,
    started_at: Timestamp,
}

impl DocumentSink {
    pub fn new(database: Database, document: &Document) -> Self {
        Self {
            database,
            document_id: document.document_id.clone(),
            started_at: document.started_at,
        }
    }
}

impl MeasurementSink for DocumentSink {
    fn persist(&mut self, table: &Table) -> Result<()> {
        self.database
            .insert_measurements(&self.document_id, &self.started_at, table)
            .map(|_| ())
    }
}
