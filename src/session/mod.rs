//! Measurement session workflow
//!
//! This module drives the operator through a measurement: choosing a
//! patient, recording torque, annotating distraction events and writing
//! notes. It is a table-driven state machine; the UI feeds it
//! [`SessionEvent`]s and listens for [`SessionNotification`]s.
//!
//! # Features
//!
//! - Static transition table, validated when the machine is built
//! - Guards that connect the hardware or dummy sensor before measuring
//! - One producer process per measurement, joined before the next starts
//! - Confirmation gates with templated prompts

pub mod context;
pub mod machine;
pub mod transitions;
pub mod types;

pub use context::{DeviceSensorFactory, SensorFactory, SessionContext};
pub use machine::SessionMachine;
pub use transitions::{Action, Guard, Transition, TRANSITIONS};
pub use types::{
    AnnotationRegion, EventKind, Outcome, SessionEvent, SessionNotification, SessionState,
};
