//! Static transition table of the session state machine
//!
//! Each row names a source state, the event kind that triggers it, an
//! optional guard, an optional action and the target state. Rows sharing a
//! source and event kind are tried in table order.

use crate::error::{CranioError, Result};
use crate::session::types::{EventKind, SessionState};
use std::collections::{HashSet, VecDeque};

/// Condition checked before a transition fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Entered patient id is not blank
    PatientIdPresent,
    /// Selected patient is in the database
    PatientKnown,
    /// Selected patient and a connected sensor passing its self test
    MeasurementReady,
    EventsAnnotated,
    NoEventsAnnotated,
    SessionExists,
}

/// Side effect run between the exit and entry hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectPatient,
    InsertPatient,
    SaveEvents,
    StageNotes,
    UpdateDocument,
    StageSession,
    ActivateSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub source: SessionState,
    pub event: EventKind,
    pub guard: Option<Guard>,
    pub action: Option<Action>,
    pub target: SessionState,
}

const fn row(
    source: SessionState,
    event: EventKind,
    guard: Option<Guard>,
    action: Option<Action>,
    target: SessionState,
) -> Transition {
    Transition {
        source,
        event,
        guard,
        action,
        target,
    }
}

use Action as A;
use EventKind as E;
use Guard as G;
use SessionState as S;

pub const TRANSITIONS: &[Transition] = &[
    row(S::ShowPatients, E::AddPatient, None, None, S::AddPatient),
    row(S::ShowPatients, E::SelectPatient, Some(G::PatientKnown), Some(A::SelectPatient), S::Idle),
    row(S::ShowPatients, E::Close, None, None, S::Idle),
    row(S::AddPatient, E::PatientEntered, Some(G::PatientIdPresent), Some(A::InsertPatient), S::ShowPatients),
    row(S::AddPatient, E::Cancel, None, None, S::ShowPatients),
    row(S::Idle, E::Start, Some(G::MeasurementReady), None, S::Measuring),
    row(S::Idle, E::ChangeSession, None, None, S::ChangeSession),
    row(S::Idle, E::ShowPatients, None, None, S::ShowPatients),
    row(S::Idle, E::Close, None, None, S::ConfirmExit),
    row(S::Measuring, E::Stop, None, None, S::EventAnnotation),
    row(S::EventAnnotation, E::AnnotationDone, Some(G::EventsAnnotated), Some(A::SaveEvents), S::NoteEntry),
    row(S::EventAnnotation, E::AnnotationDone, Some(G::NoEventsAnnotated), None, S::ConfirmNoEvents),
    row(S::EventAnnotation, E::Close, None, None, S::ConfirmNoEvents),
    row(S::ConfirmNoEvents, E::Yes, None, None, S::NoteEntry),
    row(S::ConfirmNoEvents, E::No, None, None, S::EventAnnotation),
    row(S::NoteEntry, E::NotesEntered, None, Some(A::StageNotes), S::ConfirmNotes),
    row(S::ConfirmNotes, E::Yes, None, Some(A::UpdateDocument), S::Idle),
    row(S::ConfirmNotes, E::No, None, None, S::NoteEntry),
    row(S::ChangeSession, E::SelectSession, Some(G::SessionExists), Some(A::StageSession), S::ConfirmSessionChange),
    row(S::ChangeSession, E::Cancel, None, None, S::Idle),
    row(S::ConfirmSessionChange, E::Yes, None, Some(A::ActivateSession), S::Idle),
    row(S::ConfirmSessionChange, E::No, None, None, S::ChangeSession),
    row(S::ConfirmExit, E::Yes, None, None, S::Final),
    row(S::ConfirmExit, E::No, None, None, S::Idle),
];

/// Rows for `(state, event)` in table order
pub fn candidates(
    table: &[Transition],
    state: SessionState,
    event: EventKind,
) -> impl Iterator<Item = &Transition> {
    table
        .iter()
        .filter(move |t| t.source == state && t.event == event)
}

/// Check the structural rules of a transition table
///
/// Every state except `Final` needs an outgoing row, `Final` has none, and
/// every state is reachable from the initial state.
pub fn validate(table: &[Transition]) -> Result<()> {
    for state in SessionState::ALL {
        let outgoing = table.iter().any(|t| t.source == state);
        if state.is_final() && outgoing {
            return Err(CranioError::InvalidState(format!(
                "final state {} has outgoing transitions",
                state
            )));
        }
        if !state.is_final() && !outgoing {
            return Err(CranioError::InvalidState(format!(
                "state {} has no outgoing transition",
                state
            )));
        }
    }

    let mut reached = HashSet::from([SessionState::INITIAL]);
    let mut queue = VecDeque::from([SessionState::INITIAL]);
    while let Some(state) = queue.pop_front() {
        for t in table.iter().filter(|t| t.source == state) {
            if reached.insert(t.target) {
                queue.push_back(t.target);
            }
        }
    }
    if let Some(state) = SessionState::ALL.iter().find(|s| !reached.contains(s)) {
        return Err(CranioError::InvalidState(format!(
            "state {} is unreachable",
            state
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_valid() {
        validate(TRANSITIONS).unwrap();
    }

    #[test]
    fn test_unreachable_state_is_rejected() {
        let table: Vec<Transition> = TRANSITIONS
            .iter()
            .copied()
            .filter(|t| t.target != SessionState::ConfirmExit)
            .collect();
        let err = validate(&table).unwrap_err();
        assert!(err.to_string().contains("Confirm exit"));
    }

    #[test]
    fn test_dead_end_is_rejected() {
        let table: Vec<Transition> = TRANSITIONS
            .iter()
            .copied()
            .filter(|t| t.source != SessionState::NoteEntry)
            .collect();
        assert!(validate(&table).is_err());
    }

    #[test]
    fn test_final_must_be_terminal() {
        let mut table = TRANSITIONS.to_vec();
        table.push(row(S::Final, E::No, None, None, S::Idle));
        assert!(validate(&table).is_err());
    }

    #[test]
    fn test_guarded_rows_keep_table_order() {
        let rows: Vec<_> =
            candidates(TRANSITIONS, S::EventAnnotation, E::AnnotationDone).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].guard, Some(G::EventsAnnotated));
        assert_eq!(rows[1].target, S::ConfirmNoEvents);
        assert_eq!(candidates(TRANSITIONS, S::Measuring, E::Start).count(), 0);
    }
}
