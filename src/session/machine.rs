//! Session state machine: dispatch, guards, actions and state hooks
//!
//! A dispatch walks the rows for `(current state, event kind)` in table
//! order. The first row whose guard passes fires, in this order:
//!
//! 1. exit hook of the source state
//! 2. the row's action
//! 3. entry hook of the target state
//!
//! A refused guard is not an error: the machine stays put and
//! [`Outcome::Refused`] is returned. An error from a hook or action is
//! returned to the caller and the machine stays in the source state.

use crate::backend::{lock_sensor, torque_channel, Table};
use crate::db::{AnnotatedEvent, Document, DocumentSink, Patient, Session};
use crate::error::{CranioError, Result};
use crate::session::context::SessionContext;
use crate::session::transitions::{candidates, validate, Action, Guard, Transition, TRANSITIONS};
use crate::session::types::{Outcome, SessionEvent, SessionNotification, SessionState};
use crate::types::{ConnectionStatus, EventId};
use crossbeam_channel::{unbounded, Receiver, Sender};

fn refuse<T>(reason: impl Into<String>) -> Result<T> {
    Err(CranioError::GuardRefused(reason.into()))
}

/// The measurement workflow controller
pub struct SessionMachine {
    state: SessionState,
    table: &'static [Transition],
    context: SessionContext,
    subscribers: Vec<Sender<SessionNotification>>,
}

impl SessionMachine {
    /// Validate the transition table and enter the initial state
    pub fn new(context: SessionContext) -> Result<Self> {
        validate(TRANSITIONS)?;
        let mut machine = Self {
            state: SessionState::INITIAL,
            table: TRANSITIONS,
            context,
            subscribers: Vec::new(),
        };
        machine.enter(SessionState::INITIAL)?;
        tracing::info!("Session machine started in {}", machine.state);
        Ok(machine)
    }

    pub fn current_state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_final()
    }

    /// Receive state change notifications
    pub fn subscribe(&mut self) -> Receiver<SessionNotification> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, notification: SessionNotification) {
        self.subscribers
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// Confirmation text of the current state, if it is a confirmation gate
    pub fn prompt(&self) -> Option<String> {
        self.state.prompt_template().map(|template| {
            template
                .replace(
                    "{region_count}",
                    &self.context.suggested_region_count.to_string(),
                )
                .replace("{session_info}", &self.context.session_info())
        })
    }

    /// Feed one event to the machine
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<Outcome> {
        let rows: Vec<Transition> = candidates(self.table, self.state, event.kind())
            .copied()
            .collect();
        if rows.is_empty() {
            tracing::debug!("Ignoring {:?} in {}", event.kind(), self.state);
            return Ok(Outcome::Ignored);
        }

        let mut refusal = String::new();
        for row in rows {
            if let Some(guard) = row.guard {
                match self.check(guard, &event) {
                    Ok(()) => {}
                    Err(e) if e.is_guard_refusal() => {
                        tracing::info!("{} -> {} refused: {}", row.source, row.target, e);
                        refusal = e.to_string();
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            self.fire(&row, &event)?;
            return Ok(Outcome::Transitioned {
                from: row.source,
                to: row.target,
            });
        }

        self.notify(SessionNotification::Refused {
            state: self.state,
            reason: refusal.clone(),
        });
        Ok(Outcome::Refused(refusal))
    }

    fn fire(&mut self, row: &Transition, event: &SessionEvent) -> Result<()> {
        self.exit(row.source)?;
        if let Some(action) = row.action {
            self.run(action, event)?;
        }
        self.enter(row.target)?;
        self.state = row.target;
        tracing::info!("{} -> {}", row.source, row.target);
        self.notify(SessionNotification::StateChanged {
            from: row.source,
            to: row.target,
        });
        Ok(())
    }

    /// Drain the store of the running process
    ///
    /// Called periodically by the UI while measuring. Returns the rows read
    /// since the previous call, or `None` outside of `Measuring`.
    ///
    /// A failed flush does not hide the rows from the caller: they are
    /// returned anyway and stay pending for the next flush.
    pub fn update(&mut self) -> Result<Option<Table>> {
        if self.state != SessionState::Measuring || !self.context.timer_running {
            return Ok(None);
        }
        let Some(process) = &self.context.process else {
            return Ok(None);
        };
        let store = process.store();
        let table = store.read()?;
        if let Err(e) = store.flush() {
            tracing::error!("Flush failed, {} rows pending: {}", store.pending_len(), e);
        }
        if !table.is_empty() {
            self.notify(SessionNotification::DataAvailable { rows: table.len() });
        }
        Ok(Some(table))
    }

    // ==================== Guards ====================

    fn check(&mut self, guard: Guard, event: &SessionEvent) -> Result<()> {
        match (guard, event) {
            (Guard::PatientIdPresent, SessionEvent::PatientEntered(id)) => {
                if id.trim().is_empty() {
                    return refuse("patient id is empty");
                }
                Ok(())
            }
            (Guard::PatientKnown, SessionEvent::SelectPatient(id)) => {
                if !self.context.database.patient_exists(id)? {
                    return refuse(format!("patient {} does not exist", id));
                }
                Ok(())
            }
            (Guard::MeasurementReady, _) => self.check_measurement_ready(),
            (Guard::EventsAnnotated, SessionEvent::AnnotationDone(regions)) => {
                if regions.is_empty() {
                    return refuse("no events annotated");
                }
                Ok(())
            }
            (Guard::NoEventsAnnotated, SessionEvent::AnnotationDone(regions)) => {
                if !regions.is_empty() {
                    return refuse("events were annotated");
                }
                Ok(())
            }
            (Guard::SessionExists, SessionEvent::SelectSession(id)) => {
                if self.context.database.get_session(id)?.is_none() {
                    return refuse(format!("session {} does not exist", id));
                }
                Ok(())
            }
            (guard, event) => Err(CranioError::InvalidState(format!(
                "guard {:?} cannot evaluate {:?}",
                guard,
                event.kind()
            ))),
        }
    }

    fn check_measurement_ready(&mut self) -> Result<()> {
        let ctx = &mut self.context;
        if ctx.patient_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            return refuse("no patient selected");
        }

        if ctx.sensor.is_none() {
            let sensor_config = ctx.config.sensor.clone();
            let connected = match ctx.sensor_factory().connect_hardware(&sensor_config) {
                Ok(sensor) => Some((sensor, ConnectionStatus::Connected)),
                Err(e) => {
                    tracing::warn!("Hardware sensor unavailable: {}", e);
                    if sensor_config.enable_dummy_sensor {
                        tracing::info!("Connecting dummy sensor");
                        Some((
                            ctx.sensor_factory().connect_dummy(&sensor_config)?,
                            ConnectionStatus::Dummy,
                        ))
                    } else {
                        None
                    }
                }
            };
            match connected {
                Some((sensor, status)) => {
                    ctx.sensor = Some(sensor);
                    ctx.connection_status = status;
                    self.notify(SessionNotification::ConnectionChanged(status));
                }
                None => return refuse("no sensor connected"),
            }
        }

        let ctx = &mut self.context;
        if let Some(sensor) = &ctx.sensor {
            if !lock_sensor(sensor)?.self_test() {
                return refuse("sensor self test failed");
            }
        }
        Ok(())
    }

    // ==================== Actions ====================

    fn run(&mut self, action: Action, event: &SessionEvent) -> Result<()> {
        let ctx = &mut self.context;
        match (action, event) {
            (Action::SelectPatient, SessionEvent::SelectPatient(id)) => {
                ctx.patient_id = Some(id.clone());
                tracing::info!("Selected patient {}", id);
            }
            (Action::InsertPatient, SessionEvent::PatientEntered(id)) => {
                let id = id.trim();
                if !ctx.database.patient_exists(id)? {
                    ctx.database.insert_patient(&Patient::new(id))?;
                }
                ctx.patient_id = Some(id.to_string());
            }
            (Action::SaveEvents, SessionEvent::AnnotationDone(regions)) => {
                let document = ctx.document.as_ref().ok_or_else(|| {
                    CranioError::InvalidState("no document to annotate".to_string())
                })?;
                let events = regions
                    .iter()
                    .enumerate()
                    .map(|(i, region)| {
                        AnnotatedEvent::new(
                            &document.document_id,
                            EventId::distraction(i as u32 + 1)?,
                            region.begin,
                            region.end,
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                ctx.database.insert_annotated_events(&events)?;
                tracing::info!("Saved {} annotated events", events.len());
                ctx.annotated_events = events;
            }
            (
                Action::StageNotes,
                SessionEvent::NotesEntered {
                    notes,
                    full_turn_count,
                },
            ) => {
                ctx.staged_notes = Some(notes.clone());
                ctx.staged_full_turn_count = Some(*full_turn_count);
            }
            (Action::UpdateDocument, _) => {
                let Some(document) = ctx.document.as_mut() else {
                    return Err(CranioError::InvalidState(
                        "no document to update".to_string(),
                    ));
                };
                document.notes = ctx.staged_notes.take();
                document.full_turn_count = ctx.staged_full_turn_count.take();
                ctx.database.update_document(document)?;
                tracing::info!("Updated document {}", document.document_id);
            }
            (Action::StageSession, SessionEvent::SelectSession(id)) => {
                ctx.selected_session = ctx.database.get_session(id)?;
            }
            (Action::ActivateSession, _) => {
                if let Some(session) = ctx.selected_session.take() {
                    tracing::info!("Activated session {}", session.session_id);
                    ctx.session = Some(session);
                }
            }
            (action, event) => {
                return Err(CranioError::InvalidState(format!(
                    "action {:?} cannot handle {:?}",
                    action,
                    event.kind()
                )))
            }
        }
        Ok(())
    }

    // ==================== Hooks ====================

    fn enter(&mut self, state: SessionState) -> Result<()> {
        match state {
            SessionState::ShowPatients => self.enter_show_patients(),
            SessionState::ChangeSession => {
                self.context.sessions = self.context.database.list_sessions()?;
                Ok(())
            }
            SessionState::Measuring => self.enter_measuring(),
            SessionState::EventAnnotation => self.enter_event_annotation(),
            SessionState::NoteEntry => {
                let ctx = &mut self.context;
                let turns = ctx.turns_in_full_turn().max(1);
                ctx.default_full_turn_count = ctx.annotated_events.len() as f64 / turns as f64;
                ctx.staged_notes = None;
                ctx.staged_full_turn_count = None;
                Ok(())
            }
            SessionState::Final => self.context.join_process(),
            _ => Ok(()),
        }
    }

    fn exit(&mut self, state: SessionState) -> Result<()> {
        if state == SessionState::Measuring {
            let ctx = &mut self.context;
            ctx.timer_running = false;
            if let Some(process) = ctx.process.as_mut() {
                process.pause()?;
                let table = process.store().drain()?;
                tracing::info!(
                    "Measurement stopped, {} rows in final drain",
                    table.len()
                );
            }
        }
        Ok(())
    }

    fn enter_show_patients(&mut self) -> Result<()> {
        let ctx = &mut self.context;
        ctx.patients = ctx.database.list_patients()?;
        ctx.preselected_patient = ctx
            .patient_id
            .clone()
            .or(ctx.database.most_recently_used_patient()?);
        Ok(())
    }

    fn enter_measuring(&mut self) -> Result<()> {
        let ctx = &mut self.context;
        ctx.join_process()?;

        let patient_id = ctx
            .patient_id
            .clone()
            .ok_or_else(|| CranioError::InvalidState("no patient selected".to_string()))?;
        let sensor = ctx
            .sensor
            .clone()
            .ok_or_else(|| CranioError::InvalidState("no sensor connected".to_string()))?;
        let sensor_info = lock_sensor(&sensor)?.sensor_info();

        let session_id = match &ctx.session {
            Some(session) => session.session_id.clone(),
            None => {
                let session = Session::new();
                ctx.database.insert_session(&session)?;
                tracing::info!("Created session {}", session.session_id);
                let id = session.session_id.clone();
                ctx.session = Some(session);
                id
            }
        };

        let document = Document::new(session_id, patient_id, &sensor_info.sensor_serial_number)
            .with_distractor(
                ctx.config.session.default_distractor.clone(),
                ctx.config.session.distractor_number,
            )
            .with_operator(ctx.config.session.operator.clone());
        ctx.database.upsert_sensor_info(&sensor_info)?;
        ctx.database.insert_document(&document)?;

        let sink = DocumentSink::new(ctx.database.clone(), &document);
        let mut process = ctx
            .process_factory()
            .create(&ctx.config.acquisition.process_name, Box::new(sink))?;
        process.register_sensor(sensor)?;
        process.start()?;

        tracing::info!(
            "Measuring document {} for patient {}",
            document.document_id,
            document.patient_id
        );
        ctx.process = Some(process);
        ctx.document = Some(document);
        ctx.annotated_events.clear();
        ctx.timer_running = true;
        Ok(())
    }

    fn enter_event_annotation(&mut self) -> Result<()> {
        let ctx = &mut self.context;
        ctx.time_series = match &ctx.document {
            Some(document) => ctx
                .database
                .related_time_series(&document.document_id, &torque_channel().column_name())?,
            None => Vec::new(),
        };
        ctx.suggested_region_count = ctx.turns_in_full_turn();
        ctx.annotated_events.clear();
        Ok(())
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        if let Err(e) = self.context.join_process() {
            tracing::error!("Failed to join producer process: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        create_dummy_sensor, shared, AcquisitionProcess, MeasurementSink, ProcessFactory,
        ProcessMonitor, ProcessState, SensorHandle, Store,
    };
    use crate::config::{AppConfig, SensorConfig};
    use crate::db::Database;
    use crate::session::context::SensorFactory;
    use crate::backend::Packet;
    use crate::session::types::AnnotationRegion;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Process that never spawns a thread
    struct InlineProcess {
        state: Arc<Mutex<ProcessState>>,
        store: Arc<Store>,
    }

    impl AcquisitionProcess for InlineProcess {
        fn start(&mut self) -> Result<()> {
            *self.state.lock().unwrap() = ProcessState::Running;
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            *self.state.lock().unwrap() = ProcessState::Paused;
            Ok(())
        }
        fn join(&mut self) -> Result<()> {
            *self.state.lock().unwrap() = ProcessState::Joined;
            Ok(())
        }
        fn is_alive(&self) -> bool {
            self.monitor().is_alive()
        }
        fn state(&self) -> ProcessState {
            self.monitor().state()
        }
        fn store(&self) -> Arc<Store> {
            self.store.clone()
        }
        fn register_sensor(&mut self, _sensor: SensorHandle) -> Result<bool> {
            Ok(true)
        }
        fn monitor(&self) -> ProcessMonitor {
            ProcessMonitor::new(self.state.clone())
        }
    }

    /// Sink that fails while `fail` is set
    struct GatedSink {
        inner: Box<dyn MeasurementSink>,
        fail: Arc<AtomicBool>,
    }

    impl MeasurementSink for GatedSink {
        fn persist(&mut self, table: &Table) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CranioError::Io(std::io::Error::other("disk full")));
            }
            self.inner.persist(table)
        }
    }

    #[derive(Default)]
    struct InlineFactory {
        fail_flush: Arc<AtomicBool>,
    }

    impl ProcessFactory for InlineFactory {
        fn create(
            &self,
            _name: &str,
            sink: Box<dyn MeasurementSink>,
        ) -> Result<Box<dyn AcquisitionProcess>> {
            let sink = GatedSink {
                inner: sink,
                fail: self.fail_flush.clone(),
            };
            Ok(Box::new(InlineProcess {
                state: Arc::new(Mutex::new(ProcessState::Created)),
                store: Arc::new(Store::new(Box::new(sink))),
            }))
        }
    }

    struct NoHardware;

    impl SensorFactory for NoHardware {
        fn connect_hardware(&self, _config: &SensorConfig) -> Result<SensorHandle> {
            Err(CranioError::DeviceDetection("unplugged".to_string()))
        }
        fn connect_dummy(&self, config: &SensorConfig) -> Result<SensorHandle> {
            Ok(shared(create_dummy_sensor(config.turns_in_full_turn)?))
        }
    }

    fn machine(enable_dummy: bool) -> SessionMachine {
        machine_with_factory(enable_dummy, InlineFactory::default())
    }

    fn machine_with_factory(enable_dummy: bool, factory: InlineFactory) -> SessionMachine {
        let mut config = AppConfig::default();
        config.sensor.enable_dummy_sensor = enable_dummy;
        let context = SessionContext::new(
            Database::open_in_memory().unwrap(),
            config,
            Box::new(NoHardware),
            Box::new(factory),
        );
        SessionMachine::new(context).unwrap()
    }

    fn torque_sample(value: f64) -> Packet {
        // Value doubles as millisecond offset to keep the index increasing
        Packet::single(
            Utc::now() + chrono::Duration::milliseconds(value as i64),
            vec![(torque_channel().column_name(), Some(value))],
        )
        .unwrap()
    }

    fn to_idle_with_patient(machine: &mut SessionMachine) {
        machine.dispatch(SessionEvent::AddPatient).unwrap();
        machine
            .dispatch(SessionEvent::PatientEntered("P001".into()))
            .unwrap();
        machine
            .dispatch(SessionEvent::SelectPatient("P001".into()))
            .unwrap();
        assert_eq!(machine.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_initial_state() {
        let machine = machine(false);
        assert_eq!(machine.current_state(), SessionState::ShowPatients);
        assert!(machine.prompt().is_none());
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let mut machine = machine(false);
        assert_eq!(machine.dispatch(SessionEvent::Stop).unwrap(), Outcome::Ignored);
        assert_eq!(machine.current_state(), SessionState::ShowPatients);
    }

    #[test]
    fn test_blank_patient_id_is_refused() {
        let mut machine = machine(false);
        machine.dispatch(SessionEvent::AddPatient).unwrap();
        let outcome = machine
            .dispatch(SessionEvent::PatientEntered("  ".into()))
            .unwrap();
        assert!(matches!(outcome, Outcome::Refused(_)));
        assert_eq!(machine.current_state(), SessionState::AddPatient);
    }

    #[test]
    fn test_added_patient_is_listed_and_preselected() {
        let mut machine = machine(false);
        machine.dispatch(SessionEvent::AddPatient).unwrap();
        machine
            .dispatch(SessionEvent::PatientEntered("P001".into()))
            .unwrap();
        assert_eq!(machine.current_state(), SessionState::ShowPatients);
        assert_eq!(machine.context().patients, vec!["P001"]);
        assert_eq!(machine.context().preselected_patient.as_deref(), Some("P001"));
    }

    #[test]
    fn test_unknown_patient_cannot_be_selected() {
        let mut machine = machine(true);
        let outcome = machine
            .dispatch(SessionEvent::SelectPatient("ghost".into()))
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Refused("Guard refused: patient ghost does not exist".into())
        );
        assert_eq!(machine.current_state(), SessionState::ShowPatients);
        assert!(machine.context().patient_id.is_none());
    }

    #[test]
    fn test_update_returns_rows_when_flush_fails() {
        let factory = InlineFactory::default();
        let fail_flush = factory.fail_flush.clone();
        let mut machine = machine_with_factory(true, factory);
        to_idle_with_patient(&mut machine);
        machine.dispatch(SessionEvent::Start).unwrap();

        let store = machine.context().process.as_ref().unwrap().store();
        let document_id = machine.context().document.as_ref().unwrap().document_id.clone();
        fail_flush.store(true, Ordering::SeqCst);
        store.write(torque_sample(1.0)).unwrap();
        store.write(torque_sample(2.0)).unwrap();

        let table = machine.update().unwrap().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(store.pending_len(), 2);
        assert_eq!(
            machine.context().database.measurement_count(&document_id).unwrap(),
            0
        );

        fail_flush.store(false, Ordering::SeqCst);
        assert!(machine.update().unwrap().unwrap().is_empty());
        assert_eq!(store.pending_len(), 0);
        assert_eq!(
            machine.context().database.measurement_count(&document_id).unwrap(),
            2
        );
    }

    #[test]
    fn test_start_without_patient_stays_idle() {
        let mut machine = machine(true);
        machine.dispatch(SessionEvent::Close).unwrap();
        let outcome = machine.dispatch(SessionEvent::Start).unwrap();
        assert_eq!(outcome, Outcome::Refused("Guard refused: no patient selected".into()));
        assert_eq!(machine.current_state(), SessionState::Idle);
    }

    #[test]
    fn test_start_without_sensor_or_dummy_stays_idle() {
        let mut machine = machine(false);
        to_idle_with_patient(&mut machine);
        let outcome = machine.dispatch(SessionEvent::Start).unwrap();
        assert!(matches!(outcome, Outcome::Refused(_)));
        assert_eq!(machine.current_state(), SessionState::Idle);
        assert_eq!(machine.context().connection_status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_start_connects_dummy_sensor() {
        let mut machine = machine(true);
        let notifications = machine.subscribe();
        to_idle_with_patient(&mut machine);

        assert!(machine.dispatch(SessionEvent::Start).unwrap().is_transition());
        assert_eq!(machine.current_state(), SessionState::Measuring);
        assert_eq!(machine.context().connection_status, ConnectionStatus::Dummy);
        assert!(machine.context().timer_running);
        assert!(notifications
            .try_iter()
            .any(|n| n == SessionNotification::ConnectionChanged(ConnectionStatus::Dummy)));
    }

    #[test]
    fn test_stop_pauses_and_annotation_flow() {
        let mut machine = machine(true);
        to_idle_with_patient(&mut machine);
        machine.dispatch(SessionEvent::Start).unwrap();
        assert!(machine.update().unwrap().is_some());

        machine.dispatch(SessionEvent::Stop).unwrap();
        assert_eq!(machine.current_state(), SessionState::EventAnnotation);
        let ctx = machine.context();
        assert!(!ctx.timer_running);
        assert_eq!(ctx.process.as_ref().unwrap().state(), ProcessState::Paused);
        assert_eq!(ctx.suggested_region_count, 3);
        assert!(machine.update().unwrap().is_none());

        machine
            .dispatch(SessionEvent::AnnotationDone(vec![]))
            .unwrap();
        assert_eq!(machine.current_state(), SessionState::ConfirmNoEvents);
        assert!(machine.prompt().unwrap().contains("without annotating"));
        machine.dispatch(SessionEvent::No).unwrap();

        let regions = (0..3)
            .map(|i| AnnotationRegion::new(i as f64, i as f64 + 0.5))
            .collect();
        machine
            .dispatch(SessionEvent::AnnotationDone(regions))
            .unwrap();
        assert_eq!(machine.current_state(), SessionState::NoteEntry);
        assert_eq!(machine.context().default_full_turn_count, 1.0);

        machine
            .dispatch(SessionEvent::NotesEntered {
                notes: "ok".into(),
                full_turn_count: 1.0,
            })
            .unwrap();
        machine.dispatch(SessionEvent::Yes).unwrap();
        assert_eq!(machine.current_state(), SessionState::Idle);

        let document_id = machine.context().document.as_ref().unwrap().document_id.clone();
        let stored = machine
            .context()
            .database
            .get_document(&document_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.notes.as_deref(), Some("ok"));
        assert_eq!(stored.full_turn_count, Some(1.0));
        assert_eq!(
            machine.context().database.related_events(&document_id).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_invalid_region_keeps_state() {
        let mut machine = machine(true);
        to_idle_with_patient(&mut machine);
        machine.dispatch(SessionEvent::Start).unwrap();
        machine.dispatch(SessionEvent::Stop).unwrap();

        let result = machine.dispatch(SessionEvent::AnnotationDone(vec![AnnotationRegion::new(
            2.0, 1.0,
        )]));
        assert!(matches!(result, Err(CranioError::InvalidEvent(_))));
        assert_eq!(machine.current_state(), SessionState::EventAnnotation);
    }

    #[test]
    fn test_change_session() {
        let mut machine = machine(false);
        let session = Session::new();
        machine.context().database.insert_session(&session).unwrap();
        machine.dispatch(SessionEvent::Close).unwrap();
        machine.dispatch(SessionEvent::ChangeSession).unwrap();
        assert_eq!(machine.context().sessions.len(), 1);

        let outcome = machine
            .dispatch(SessionEvent::SelectSession("missing".into()))
            .unwrap();
        assert!(matches!(outcome, Outcome::Refused(_)));

        machine
            .dispatch(SessionEvent::SelectSession(session.session_id.clone()))
            .unwrap();
        assert_eq!(machine.current_state(), SessionState::ConfirmSessionChange);
        assert!(machine.prompt().unwrap().contains(&session.session_id));

        machine.dispatch(SessionEvent::Yes).unwrap();
        assert_eq!(machine.current_state(), SessionState::Idle);
        assert_eq!(
            machine.context().session.as_ref().unwrap().session_id,
            session.session_id
        );
    }

    #[test]
    fn test_exit_confirmation() {
        let mut machine = machine(false);
        machine.dispatch(SessionEvent::Close).unwrap();
        machine.dispatch(SessionEvent::Close).unwrap();
        assert_eq!(machine.current_state(), SessionState::ConfirmExit);
        machine.dispatch(SessionEvent::No).unwrap();
        assert_eq!(machine.current_state(), SessionState::Idle);
        machine.dispatch(SessionEvent::Close).unwrap();
        machine.dispatch(SessionEvent::Yes).unwrap();
        assert!(machine.is_finished());
        assert_eq!(machine.dispatch(SessionEvent::No).unwrap(), Outcome::Ignored);
    }
}
