//! Producer process: runs a [`Producer`] and a [`Store`] on their own thread.
//!
//! The controller owns a [`ProducerProcess`] and talks to its worker thread
//! over a crossbeam channel. The worker waits for commands with a deadline
//! equal to the next poll instant. `start` never blocks. `pause` waits for
//! the worker to acknowledge, so once it returns the poll in flight (if any)
//! has landed in the store and nothing more is written until a resume.
//!
//! # Lifecycle
//!
//! ```text
//! Created --start--> Running <--pause/start--> Paused
//!    |                  |                         |
//!    +------join--------+----------join-----------+--> Joined
//! ```
//!
//! The first poll happens one interval after `start` (or a resume), and
//! every poll result that carries data is written to the store. A sensor
//! failure never stops the loop; the [`Producer`] turns it into missing
//! values. If the worker thread dies anyway, the process reports `Joined`
//! and `is_alive()` turns false.

use crate::backend::producer::Producer;
use crate::backend::sensor_trait::{PollStats, SensorHandle};
use crate::backend::store::{MeasurementSink, Store};
use crate::error::{CranioError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lifecycle state of an acquisition process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Paused,
    /// Terminal
    Joined,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Created => write!(f, "created"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Paused => write!(f, "paused"),
            ProcessState::Joined => write!(f, "joined"),
        }
    }
}

/// Commands sent from the controller to the worker thread
#[derive(Debug, Clone)]
pub enum ProcessCommand {
    Resume,
    /// Stop polling, then acknowledge on the given channel
    Pause(Sender<()>),
    Shutdown,
}

/// Read-only view of a process state that outlives the process handle
#[derive(Debug, Clone)]
pub struct ProcessMonitor {
    state: Arc<Mutex<ProcessState>>,
}

impl ProcessMonitor {
    pub fn new(state: Arc<Mutex<ProcessState>>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state(), ProcessState::Running | ProcessState::Paused)
    }
}

/// A sensor acquisition loop the session controller can drive
pub trait AcquisitionProcess: Send {
    /// Start the loop, or resume it when paused
    fn start(&mut self) -> Result<()>;

    /// Stop polling without ending the process
    fn pause(&mut self) -> Result<()>;

    /// End the process and wait for its thread; idempotent
    fn join(&mut self) -> Result<()>;

    fn is_alive(&self) -> bool;

    fn state(&self) -> ProcessState;

    /// Store the process writes its packets to
    fn store(&self) -> Arc<Store>;

    /// Add a sensor to the polled set. Returns `false` if already registered.
    fn register_sensor(&mut self, sensor: SensorHandle) -> Result<bool>;

    fn monitor(&self) -> ProcessMonitor;
}

/// Creates acquisition processes bound to a measurement sink
pub trait ProcessFactory: Send {
    fn create(
        &self,
        name: &str,
        sink: Box<dyn MeasurementSink>,
    ) -> Result<Box<dyn AcquisitionProcess>>;
}

/// Factory for thread-backed [`ProducerProcess`]es
#[derive(Debug, Clone)]
pub struct ThreadProcessFactory {
    poll_interval: Duration,
}

impl ThreadProcessFactory {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl ProcessFactory for ThreadProcessFactory {
    fn create(
        &self,
        name: &str,
        sink: Box<dyn MeasurementSink>,
    ) -> Result<Box<dyn AcquisitionProcess>> {
        Ok(Box::new(ProducerProcess::new(
            name,
            self.poll_interval,
            Store::new(sink),
        )))
    }
}

/// A [`Producer`] polled on a dedicated thread, writing to a [`Store`]
pub struct ProducerProcess {
    name: String,
    interval: Duration,
    producer: Arc<Mutex<Producer>>,
    store: Arc<Store>,
    state: Arc<Mutex<ProcessState>>,
    command_tx: Option<Sender<ProcessCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl ProducerProcess {
    pub fn new(name: impl Into<String>, interval: Duration, store: Store) -> Self {
        Self {
            name: name.into(),
            interval,
            producer: Arc::new(Mutex::new(Producer::new())),
            store: Arc::new(store),
            state: Arc::new(Mutex::new(ProcessState::Created)),
            command_tx: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot of the producer's poll statistics
    pub fn stats(&self) -> Result<PollStats> {
        Ok(self.producer()?.stats().clone())
    }

    fn producer(&self) -> Result<MutexGuard<'_, Producer>> {
        self.producer
            .lock()
            .map_err(|e| CranioError::Channel(format!("Producer lock poisoned: {}", e)))
    }

    fn set_state(&self, state: ProcessState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn send(&self, command: ProcessCommand) -> Result<()> {
        match &self.command_tx {
            Some(tx) => tx
                .send(command)
                .map_err(|e| CranioError::Channel(format!("{}: worker gone: {}", self.name, e))),
            None => Err(CranioError::InvalidState(format!(
                "{} has no worker thread",
                self.name
            ))),
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let (command_tx, command_rx) = unbounded();
        let worker = Worker {
            name: self.name.clone(),
            interval: self.interval,
            producer: self.producer.clone(),
            store: self.store.clone(),
            state: self.state.clone(),
            command_rx,
        };
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker.run())?;
        self.command_tx = Some(command_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the worker to pause and wait until it has
    fn request_pause(&mut self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        let acked = self.send(ProcessCommand::Pause(ack_tx)).and_then(|()| {
            ack_rx
                .recv()
                .map_err(|e| CranioError::Channel(format!("{}: no pause ack: {}", self.name, e)))
        });
        match acked {
            Ok(()) => {
                self.set_state(ProcessState::Paused);
                tracing::debug!("{} paused", self.name);
                Ok(())
            }
            Err(e) => {
                tracing::error!("{} worker died before pausing: {}", self.name, e);
                self.join()
            }
        }
    }

    /// Worker thread ended without being joined
    fn worker_died(&self) -> bool {
        self.handle.is_some() && self.state() == ProcessState::Joined
    }
}

impl AcquisitionProcess for ProducerProcess {
    fn start(&mut self) -> Result<()> {
        match self.state() {
            ProcessState::Created => {
                self.spawn()?;
                self.set_state(ProcessState::Running);
                tracing::info!("{} started", self.name);
                Ok(())
            }
            ProcessState::Paused => {
                self.send(ProcessCommand::Resume)?;
                self.set_state(ProcessState::Running);
                tracing::debug!("{} resumed", self.name);
                Ok(())
            }
            ProcessState::Running => Ok(()),
            ProcessState::Joined => Err(CranioError::InvalidState(format!(
                "{} cannot be started after join",
                self.name
            ))),
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.state() {
            ProcessState::Running => self.request_pause(),
            ProcessState::Paused => Ok(()),
            // Reap the dead thread so the caller can go on
            ProcessState::Joined if self.worker_died() => self.join(),
            state => Err(CranioError::InvalidState(format!(
                "{} cannot be paused while {}",
                self.name, state
            ))),
        }
    }

    fn join(&mut self) -> Result<()> {
        if self.state() == ProcessState::Joined && self.handle.is_none() {
            return Ok(());
        }
        if let Some(tx) = self.command_tx.take() {
            // The worker also exits when the channel disconnects
            let _ = tx.send(ProcessCommand::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("{} worker thread panicked", self.name);
            }
        }
        self.set_state(ProcessState::Joined);
        tracing::info!("{} joined", self.name);
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

    fn register_sensor(&mut self, sensor: SensorHandle) -> Result<bool> {
        if self.state() == ProcessState::Joined {
            return Err(CranioError::InvalidState(format!(
                "{} is joined",
                self.name
            )));
        }
        Ok(self.producer()?.register_sensor(sensor))
    }

    fn monitor(&self) -> ProcessMonitor {
        ProcessMonitor::new(self.state.clone())
    }
}

impl Drop for ProducerProcess {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.join();
        }
    }
}

/// State moved onto the worker thread
struct Worker {
    name: String,
    interval: Duration,
    producer: Arc<Mutex<Producer>>,
    store: Arc<Store>,
    state: Arc<Mutex<ProcessState>>,
    command_rx: Receiver<ProcessCommand>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("{} worker thread died", self.name);
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ProcessState::Joined;
        }
    }
}

impl Worker {
    fn run(self) {
        tracing::info!("{} worker started", self.name);

        let mut polling = true;
        let mut next_poll = Instant::now() + self.interval;

        loop {
            let command = if polling {
                let timeout = next_poll.saturating_duration_since(Instant::now());
                self.command_rx.recv_timeout(timeout)
            } else {
                self.command_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected)
            };

            match command {
                Ok(ProcessCommand::Resume) => {
                    if !polling {
                        polling = true;
                        next_poll = Instant::now() + self.interval;
                    }
                }
                Ok(ProcessCommand::Pause(ack)) => {
                    polling = false;
                    // The controller may have given up waiting
                    let _ = ack.send(());
                }
                Ok(ProcessCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    self.poll();
                    next_poll += self.interval;
                    let now = Instant::now();
                    if next_poll <= now {
                        // Fell behind, skip the missed ticks
                        next_poll = now + self.interval;
                    }
                }
            }
        }

        tracing::info!("{} worker stopped", self.name);
    }

    fn poll(&self) {
        let packet = match self.producer.lock() {
            Ok(mut producer) => producer.read_all(),
            Err(e) => {
                tracing::error!("{}: producer lock poisoned: {}", self.name, e);
                return;
            }
        };
        if let Some(packet) = packet {
            if let Err(e) = self.store.write(packet) {
                tracing::error!("{}: failed to store packet: {}", self.name, e);
            }
        }
    }
}
