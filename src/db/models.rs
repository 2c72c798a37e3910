//! Persisted records.

use crate::error::{CranioError, Result};
use crate::types::{DistractorType, EventId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a unique record identifier
pub fn generate_unique_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub created_at: Timestamp,
}

impl Patient {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// One run of the application, grouping the documents recorded in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at: Timestamp,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: generate_unique_id(),
            started_at: Utc::now(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata of one recorded measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub session_id: String,
    pub patient_id: String,
    pub distractor_number: u32,
    pub distractor_type: DistractorType,
    pub operator: String,
    pub started_at: Timestamp,
    pub sensor_serial_number: String,
    pub notes: Option<String>,
    pub full_turn_count: Option<f64>,
}

impl Document {
    /// New document started now
    pub fn new(
        session_id: impl Into<String>,
        patient_id: impl Into<String>,
        sensor_serial_number: impl Into<String>,
    ) -> Self {
        Self {
            document_id: generate_unique_id(),
            session_id: session_id.into(),
            patient_id: patient_id.into(),
            distractor_number: 1,
            distractor_type: DistractorType::default(),
            operator: String::new(),
            started_at: Utc::now(),
            sensor_serial_number: sensor_serial_number.into(),
            notes: None,
            full_turn_count: None,
        }
    }

    pub fn with_distractor(mut self, distractor_type: DistractorType, number: u32) -> Self {
        self.distractor_type = distractor_type;
        self.distractor_number = number;
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    /// Seconds between the document start and `at`
    pub fn elapsed_seconds(&self, at: &Timestamp) -> f64 {
        let delta = *at - self.started_at;
        delta
            .num_microseconds()
            .map(|us| us as f64 / 1e6)
            .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1e3)
    }
}

/// A region of a document's time series marked as one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedEvent {
    pub document_id: String,
    pub event: EventId,
    /// Region start, seconds since the document started
    pub region_begin: f64,
    /// Region end, seconds since the document started
    pub region_end: f64,
    pub annotation_done: bool,
    pub recorded: bool,
}

impl AnnotatedEvent {
    /// Annotated region; the region must not be empty
    pub fn new(
        document_id: impl Into<String>,
        event: EventId,
        region_begin: f64,
        region_end: f64,
    ) -> Result<Self> {
        if !(region_begin < region_end) {
            return Err(CranioError::InvalidEvent(format!(
                "region begin {} must be smaller than end {}",
                region_begin, region_end
            )));
        }
        Ok(Self {
            document_id: document_id.into(),
            event,
            region_begin,
            region_end,
            annotation_done: true,
            recorded: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids() {
        assert_ne!(generate_unique_id(), generate_unique_id());
        assert_ne!(Session::new().session_id, Session::new().session_id);
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("s", "p", "FTSLQ6QIA")
            .with_distractor(DistractorType::Kls, 2)
            .with_operator("op");
        assert_eq!(doc.distractor_number, 2);
        assert_eq!(doc.operator, "op");
        assert!(doc.notes.is_none());
    }

    #[test]
    fn test_elapsed_seconds() {
        let doc = Document::new("s", "p", "x");
        let later = doc.started_at + chrono::Duration::milliseconds(1500);
        assert!((doc.elapsed_seconds(&later) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_annotated_event_region_must_be_ordered() {
        let id = EventId::distraction(1).unwrap();
        assert!(AnnotatedEvent::new("d", id, 1.0, 2.0).is_ok());
        assert!(AnnotatedEvent::new("d", id, 2.0, 2.0).is_err());
        assert!(AnnotatedEvent::new("d", id, f64::NAN, 2.0).is_err());
    }
}
