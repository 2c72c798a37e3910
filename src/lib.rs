//! # cranio: Craniodistraction Measurement Core
//!
//! Acquisition core and measurement workflow for a torque-measuring
//! craniodistraction device. A torque gauge is polled on a worker thread,
//! samples are buffered as timestamped packets and persisted to SQLite,
//! and a table-driven state machine walks the operator through patient
//! selection, measurement, event annotation and notes.
//!
//! ## Architecture
//!
//! - **Backend**: Sensors, the producer and its store, run by a producer process thread
//! - **Session**: Validated state machine with guards, actions and entry/exit hooks
//! - **Database**: rusqlite persistence of patients, sessions, documents and measurements
//! - **Communication**: Crossbeam channels between the controller and the worker and
//!   from the machine to the UI
//!
//! ## Configuration
//!
//! Configuration and data are stored in the platform-appropriate data
//! directory under `fi.cranio.cranio`:
//!
//! - **Linux**: `~/.local/share/fi.cranio.cranio/`
//! - **macOS**: `~/Library/Application Support/fi.cranio.cranio/`
//! - **Windows**: `%APPDATA%\fi.cranio.cranio\`
//!
//! ## Example
//!
//! ```ignore
//! use cranio::{
//!     backend::ThreadProcessFactory,
//!     config::AppConfig,
//!     db::Database,
//!     session::{DeviceSensorFactory, SessionContext, SessionEvent, SessionMachine},
//! };
//!
//! let config = AppConfig::load_or_default();
//! let database = Database::open(config.database_path()?)?;
//! let factory = ThreadProcessFactory::new(config.acquisition.poll_interval());
//! let context = SessionContext::new(database, config, Box::new(DeviceSensorFactory), Box::new(factory));
//!
//! let mut machine = SessionMachine::new(context)?;
//! machine.dispatch(SessionEvent::AddPatient)?;
//! machine.dispatch(SessionEvent::PatientEntered("P001".into()))?;
//! machine.dispatch(SessionEvent::SelectPatient("P001".into()))?;
//! machine.dispatch(SessionEvent::Start)?;
//! let table = machine.update()?;
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use app::ConsoleApp;
pub use backend::{Packet, Producer, ProducerProcess, Store};
pub use config::AppConfig;
pub use db::Database;
pub use error::{CranioError, Result};
pub use session::{SessionEvent, SessionMachine, SessionState};
pub use types::{ChannelInfo, ConnectionStatus, EventId, SensorInfo};
