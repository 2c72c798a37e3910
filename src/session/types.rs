//! Session state machine data types

use crate::types::ConnectionStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Screens of the measurement workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Patient list; the initial state
    ShowPatients,
    AddPatient,
    /// Ready to measure
    Idle,
    /// Producer process running, UI timer draining the store
    Measuring,
    EventAnnotation,
    ConfirmNoEvents,
    NoteEntry,
    ConfirmNotes,
    ChangeSession,
    ConfirmSessionChange,
    ConfirmExit,
    /// Terminal
    Final,
}

impl SessionState {
    pub const ALL: [SessionState; 12] = [
        SessionState::ShowPatients,
        SessionState::AddPatient,
        SessionState::Idle,
        SessionState::Measuring,
        SessionState::EventAnnotation,
        SessionState::ConfirmNoEvents,
        SessionState::NoteEntry,
        SessionState::ConfirmNotes,
        SessionState::ChangeSession,
        SessionState::ConfirmSessionChange,
        SessionState::ConfirmExit,
        SessionState::Final,
    ];

    pub const INITIAL: SessionState = SessionState::ShowPatients;

    /// Check if this is a yes/no confirmation gate
    pub fn is_confirmation(&self) -> bool {
        self.prompt_template().is_some()
    }

    pub fn is_final(&self) -> bool {
        matches!(self, SessionState::Final)
    }

    /// Confirmation message with `{region_count}` and `{session_info}` placeholders
    pub fn prompt_template(&self) -> Option<&'static str> {
        match self {
            SessionState::ConfirmNoEvents => Some(
                "Are you sure you want to continue without annotating any events for the recorded data?",
            ),
            SessionState::ConfirmNotes => Some("Are you sure you want to continue?"),
            SessionState::ConfirmSessionChange => Some(
                "You have selected session {session_info}. Are you sure you want to continue?",
            ),
            SessionState::ConfirmExit => Some("Are you sure you want to exit the application?"),
            _ => None,
        }
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::ShowPatients => "Patients",
            SessionState::AddPatient => "Add patient",
            SessionState::Idle => "Idle",
            SessionState::Measuring => "Measuring",
            SessionState::EventAnnotation => "Event annotation",
            SessionState::ConfirmNoEvents => "Confirm no events",
            SessionState::NoteEntry => "Notes",
            SessionState::ConfirmNotes => "Confirm notes",
            SessionState::ChangeSession => "Change session",
            SessionState::ConfirmSessionChange => "Confirm session change",
            SessionState::ConfirmExit => "Confirm exit",
            SessionState::Final => "Exited",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Region of the recorded time series marked as one distraction event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRegion {
    /// Seconds since the document started
    pub begin: f64,
    pub end: f64,
}

impl AnnotationRegion {
    pub fn new(begin: f64, end: f64) -> Self {
        Self { begin, end }
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AddPatient,
    SelectPatient(String),
    PatientEntered(String),
    Start,
    Stop,
    ChangeSession,
    ShowPatients,
    AnnotationDone(Vec<AnnotationRegion>),
    NotesEntered { notes: String, full_turn_count: f64 },
    SelectSession(String),
    Yes,
    No,
    Cancel,
    Close,
}

/// Payload-free discriminant of a [`SessionEvent`], used as the table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AddPatient,
    SelectPatient,
    PatientEntered,
    Start,
    Stop,
    ChangeSession,
    ShowPatients,
    AnnotationDone,
    NotesEntered,
    SelectSession,
    Yes,
    No,
    Cancel,
    Close,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::AddPatient => EventKind::AddPatient,
            SessionEvent::SelectPatient(_) => EventKind::SelectPatient,
            SessionEvent::PatientEntered(_) => EventKind::PatientEntered,
            SessionEvent::Start => EventKind::Start,
            SessionEvent::Stop => EventKind::Stop,
            SessionEvent::ChangeSession => EventKind::ChangeSession,
            SessionEvent::ShowPatients => EventKind::ShowPatients,
            SessionEvent::AnnotationDone(_) => EventKind::AnnotationDone,
            SessionEvent::NotesEntered { .. } => EventKind::NotesEntered,
            SessionEvent::SelectSession(_) => EventKind::SelectSession,
            SessionEvent::Yes => EventKind::Yes,
            SessionEvent::No => EventKind::No,
            SessionEvent::Cancel => EventKind::Cancel,
            SessionEvent::Close => EventKind::Close,
        }
    }
}

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Transitioned {
        from: SessionState,
        to: SessionState,
    },
    /// Every matching guard refused; the state is unchanged
    Refused(String),
    /// No transition for this event in the current state
    Ignored,
}

impl Outcome {
    pub fn is_transition(&self) -> bool {
        matches!(self, Outcome::Transitioned { .. })
    }
}

/// Message published to UI subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Refused {
        state: SessionState,
        reason: String,
    },
    ConnectionChanged(ConnectionStatus),
    /// Rows drained from the store by the last update
    DataAvailable { rows: usize },
}
