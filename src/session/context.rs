//! Mutable state shared by the session hooks and actions

use crate::backend::imada::ImadaSensor;
use crate::backend::{create_dummy_sensor, lock_sensor, shared, AcquisitionProcess, ProcessFactory, SensorHandle};
use crate::config::{AppConfig, SensorConfig};
use crate::db::{AnnotatedEvent, Database, Document, Session};
use crate::error::Result;
use crate::types::{ConnectionStatus, SensorInfo};

/// Connects sensors for the measurement guard
pub trait SensorFactory: Send {
    /// Detect and open the hardware gauge
    fn connect_hardware(&self, config: &SensorConfig) -> Result<SensorHandle>;

    /// Create the software sensor
    fn connect_dummy(&self, config: &SensorConfig) -> Result<SensorHandle>;
}

/// Factory for the Imada gauge and the dummy sensor
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceSensorFactory;

impl SensorFactory for DeviceSensorFactory {
    fn connect_hardware(&self, config: &SensorConfig) -> Result<SensorHandle> {
        let mut sensor = ImadaSensor::detect(config)?;
        sensor.open()?;
        Ok(shared(sensor))
    }

    fn connect_dummy(&self, config: &SensorConfig) -> Result<SensorHandle> {
        Ok(shared(create_dummy_sensor(config.turns_in_full_turn)?))
    }
}

/// Everything the state machine hooks read and write
///
/// States carry no data of their own; the machine passes this context to
/// every guard, action and hook.
pub struct SessionContext {
    pub database: Database,
    pub config: AppConfig,

    /// Patient the next measurement belongs to
    pub patient_id: Option<String>,
    /// Patient list shown on the patients screen
    pub patients: Vec<String>,
    /// Most recently used patient, offered as the default selection
    pub preselected_patient: Option<String>,

    /// Active session; created on the first measurement if absent
    pub session: Option<Session>,
    /// Sessions offered on the change session screen, newest first
    pub sessions: Vec<Session>,
    /// Session picked but not yet confirmed
    pub selected_session: Option<Session>,

    pub sensor: Option<SensorHandle>,
    pub connection_status: ConnectionStatus,

    pub process: Option<Box<dyn AcquisitionProcess>>,
    /// Document of the current or last measurement
    pub document: Option<Document>,
    /// Whether the UI should call `update()` periodically
    pub timer_running: bool,

    /// Torque time series of the last measurement, `(seconds, value)`
    pub time_series: Vec<(f64, f64)>,
    /// Number of regions the operator is asked to annotate
    pub suggested_region_count: u32,
    pub annotated_events: Vec<AnnotatedEvent>,

    pub default_full_turn_count: f64,
    pub staged_notes: Option<String>,
    pub staged_full_turn_count: Option<f64>,

    sensor_factory: Box<dyn SensorFactory>,
    process_factory: Box<dyn ProcessFactory>,
}

impl SessionContext {
    pub fn new(
        database: Database,
        config: AppConfig,
        sensor_factory: Box<dyn SensorFactory>,
        process_factory: Box<dyn ProcessFactory>,
    ) -> Self {
        Self {
            database,
            config,
            patient_id: None,
            patients: Vec::new(),
            preselected_patient: None,
            session: None,
            sessions: Vec::new(),
            selected_session: None,
            sensor: None,
            connection_status: ConnectionStatus::Disconnected,
            process: None,
            document: None,
            timer_running: false,
            time_series: Vec::new(),
            suggested_region_count: 0,
            annotated_events: Vec::new(),
            default_full_turn_count: 0.0,
            staged_notes: None,
            staged_full_turn_count: None,
            sensor_factory,
            process_factory,
        }
    }

    pub fn sensor_factory(&self) -> &dyn SensorFactory {
        self.sensor_factory.as_ref()
    }

    pub fn process_factory(&self) -> &dyn ProcessFactory {
        self.process_factory.as_ref()
    }

    /// Info of the connected sensor, if any
    pub fn sensor_info(&self) -> Result<Option<SensorInfo>> {
        match &self.sensor {
            Some(handle) => Ok(Some(lock_sensor(handle)?.sensor_info())),
            None => Ok(None),
        }
    }

    /// Turns per full turn of the connected sensor, or the configured value
    pub fn turns_in_full_turn(&self) -> u32 {
        self.sensor_info()
            .ok()
            .flatten()
            .map(|info| info.turns_in_full_turn)
            .unwrap_or(self.config.sensor.turns_in_full_turn)
    }

    /// Join the live process, persist what is left in its store and drop it
    ///
    /// If the final flush fails the process is kept so a later call retries.
    pub fn join_process(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        process.join()?;
        match process.store().drain() {
            Ok(table) => {
                if !table.is_empty() {
                    tracing::warn!("Persisted {} rows left in the store after join", table.len());
                }
                Ok(())
            }
            Err(e) => {
                self.process = Some(process);
                Err(e)
            }
        }
    }

    /// Text used for `{session_info}` in confirmation prompts
    pub fn session_info(&self) -> String {
        match &self.selected_session {
            Some(session) => format!(
                "{} ({})",
                session.session_id,
                session.started_at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => String::new(),
        }
    }
}
