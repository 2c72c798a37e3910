//! Line-oriented console front end
//!
//! [`ConsoleApp`] reads operator commands, turns them into
//! [`SessionEvent`]s for the [`SessionMachine`] and prints the resulting
//! state, prompts and notifications. While measuring it drains the store at
//! the UI update interval, the same way a graphical front end would on its
//! timer.

use crate::error::{CranioError, Result};
use crate::session::{
    AnnotationRegion, Outcome, SessionEvent, SessionMachine, SessionNotification, SessionState,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, Write};
use std::time::Duration;

const HELP: &str = "\
Commands:
  patients                  show the patient list
  add [id]                  add a patient
  select <id>               select a patient
  start | stop              start or stop a measurement
  annotate <b:e> [<b:e>..]  annotate event regions in seconds
  notes <count> [text]      enter full turn count and notes
  sessions                  change the active session
  session <id>              select a session
  yes | no | cancel | close answer a prompt or leave a screen
  status                    show the current state
  help                      show this help";

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Events dispatched in order
    Events(Vec<SessionEvent>),
    Status,
    Help,
}

fn parse_region(token: &str) -> Result<AnnotationRegion> {
    let (begin, end) = token.split_once(':').ok_or_else(|| {
        CranioError::InvalidCommand(format!("expected <begin>:<end>, got '{}'", token))
    })?;
    let parse = |value: &str| {
        value.trim().parse::<f64>().map_err(|_| {
            CranioError::InvalidCommand(format!("'{}' is not a number", value))
        })
    };
    Ok(AnnotationRegion::new(parse(begin)?, parse(end)?))
}

/// Parse one input line
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let require_arg = |what: &str| {
        if rest.is_empty() {
            Err(CranioError::InvalidCommand(format!("{} requires {}", word, what)))
        } else {
            Ok(rest.to_string())
        }
    };

    let event = match word.to_ascii_lowercase().as_str() {
        "status" => return Ok(Command::Status),
        "help" | "?" => return Ok(Command::Help),
        "patients" => SessionEvent::ShowPatients,
        "add" if rest.is_empty() => SessionEvent::AddPatient,
        "add" => {
            return Ok(Command::Events(vec![
                SessionEvent::AddPatient,
                SessionEvent::PatientEntered(rest.to_string()),
            ]))
        }
        "select" => SessionEvent::SelectPatient(require_arg("a patient id")?),
        "start" => SessionEvent::Start,
        "stop" => SessionEvent::Stop,
        "annotate" => SessionEvent::AnnotationDone(
            rest.split_whitespace()
                .map(parse_region)
                .collect::<Result<Vec<_>>>()?,
        ),
        "notes" => {
            let (count, text) = match rest.split_once(char::is_whitespace) {
                Some((count, text)) => (count, text.trim()),
                None => (rest, ""),
            };
            let full_turn_count = count.parse::<f64>().map_err(|_| {
                CranioError::InvalidCommand("notes requires a full turn count".to_string())
            })?;
            SessionEvent::NotesEntered {
                notes: text.to_string(),
                full_turn_count,
            }
        }
        "sessions" => SessionEvent::ChangeSession,
        "session" => SessionEvent::SelectSession(require_arg("a session id")?),
        "yes" | "y" => SessionEvent::Yes,
        "no" | "n" => SessionEvent::No,
        "cancel" => SessionEvent::Cancel,
        "close" | "exit" | "quit" => SessionEvent::Close,
        "" => return Err(CranioError::InvalidCommand("empty command".to_string())),
        other => {
            return Err(CranioError::InvalidCommand(format!(
                "unknown command '{}'",
                other
            )))
        }
    };
    Ok(Command::Events(vec![event]))
}

/// Spawn a thread forwarding stdin lines to a channel
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Console driver of a [`SessionMachine`]
pub struct ConsoleApp<W: Write> {
    machine: SessionMachine,
    notifications: Receiver<SessionNotification>,
    ui_interval: Duration,
    out: W,
}

impl<W: Write> ConsoleApp<W> {
    pub fn new(mut machine: SessionMachine, ui_interval: Duration, out: W) -> Self {
        let notifications = machine.subscribe();
        Self {
            machine,
            notifications,
            ui_interval,
            out,
        }
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Process input lines until the machine finishes or input ends
    pub fn run(&mut self, lines: Receiver<String>) -> Result<()> {
        self.print_screen()?;
        while !self.machine.is_finished() {
            match lines.recv_timeout(self.ui_interval) {
                Ok(line) => self.handle_line(&line)?,
                Err(RecvTimeoutError::Timeout) => self.tick()?,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("Input closed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one input line; command and hook errors are reported, not returned
    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        match parse_command(line) {
            Ok(Command::Help) => writeln!(self.out, "{}", HELP)?,
            Ok(Command::Status) => self.print_status()?,
            Ok(Command::Events(events)) => {
                for event in events {
                    match self.machine.dispatch(event) {
                        Ok(Outcome::Ignored) => {
                            writeln!(
                                self.out,
                                "Not available in {}",
                                self.machine.current_state()
                            )?;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("Dispatch failed: {}", e);
                            writeln!(self.out, "Error: {}", e)?;
                        }
                    }
                }
                self.print_notifications()?;
                self.print_screen()?;
            }
            Err(e) => writeln!(self.out, "{}", e)?,
        }
        Ok(())
    }

    /// UI timer tick
    pub fn tick(&mut self) -> Result<()> {
        if let Err(e) = self.machine.update() {
            tracing::error!("Update failed: {}", e);
            writeln!(self.out, "Error: {}", e)?;
        }
        self.print_notifications()
    }

    fn print_notifications(&mut self) -> Result<()> {
        while let Ok(notification) = self.notifications.try_recv() {
            match notification {
                SessionNotification::Refused { reason, .. } => {
                    writeln!(self.out, "Refused: {}", reason)?
                }
                SessionNotification::ConnectionChanged(status) => {
                    writeln!(self.out, "Sensor: {}", status)?
                }
                SessionNotification::DataAvailable { rows } => {
                    writeln!(self.out, "Received {} samples", rows)?
                }
                SessionNotification::StateChanged { .. } => {}
            }
        }
        Ok(())
    }

    fn print_screen(&mut self) -> Result<()> {
        let state = self.machine.current_state();
        writeln!(self.out, "[{}]", state)?;
        let ctx = self.machine.context();
        match state {
            SessionState::ShowPatients => {
                for patient in &ctx.patients {
                    let marker = if ctx.preselected_patient.as_ref() == Some(patient) {
                        "*"
                    } else {
                        " "
                    };
                    writeln!(self.out, " {} {}", marker, patient)?;
                }
            }
            SessionState::ChangeSession => {
                for session in &ctx.sessions {
                    writeln!(
                        self.out,
                        "   {} {}",
                        session.session_id,
                        session.started_at.format("%Y-%m-%d %H:%M")
                    )?;
                }
            }
            SessionState::EventAnnotation => {
                writeln!(
                    self.out,
                    "{} samples recorded, annotate {} regions",
                    ctx.time_series.len(),
                    ctx.suggested_region_count
                )?;
            }
            SessionState::NoteEntry => {
                writeln!(
                    self.out,
                    "Full turn count (suggested {:.2}) and notes:",
                    ctx.default_full_turn_count
                )?;
            }
            _ => {}
        }
        if let Some(prompt) = self.machine.prompt() {
            writeln!(self.out, "{} (yes/no)", prompt)?;
        }
        Ok(())
    }

    fn print_status(&mut self) -> Result<()> {
        let ctx = self.machine.context();
        writeln!(self.out, "State:   {}", self.machine.current_state())?;
        writeln!(
            self.out,
            "Patient: {}",
            ctx.patient_id.as_deref().unwrap_or("-")
        )?;
        writeln!(
            self.out,
            "Session: {}",
            ctx.session.as_ref().map_or("-", |s| s.session_id.as_str())
        )?;
        writeln!(self.out, "Sensor:  {}", ctx.connection_status)?;
        Ok(())
    }
}
