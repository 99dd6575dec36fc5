// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Run events
//!
//! The executor reports log lines, progress and stage boundaries through an
//! [`EventSender`]. Delivery is fire-and-forget over an unbounded channel, so
//! a slow or absent host never blocks a run. The host drains the matching
//! [`EventReceiver`] on whatever task or thread it owns.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Level of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    Progress {
        percent: u8,
        message: String,
    },
    StageStarted {
        name: String,
        description: String,
    },
    StageCompleted {
        name: String,
        success: bool,
        duration_secs: f64,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    mirror_to_tracing: bool,
}

/// Receiving half of the event channel
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

/// Create a connected sender/receiver pair
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender {
            tx: Some(tx),
            mirror_to_tracing: false,
        },
        EventReceiver { rx },
    )
}

impl EventSender {
    /// A sender that drops every event
    pub fn disabled() -> Self {
        Self {
            tx: None,
            mirror_to_tracing: false,
        }
    }

    /// A sender that only writes log events to `tracing`
    pub fn tracing_only() -> Self {
        Self {
            tx: None,
            mirror_to_tracing: true,
        }
    }

    /// Also write log events to `tracing`
    pub fn mirrored(mut self) -> Self {
        self.mirror_to_tracing = true;
        self
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver means the host stopped listening; the run goes on.
            let _ = tx.send(event);
        }
    }

    pub fn emit_log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        if self.mirror_to_tracing {
            match level {
                LogLevel::Debug => tracing::debug!(target: "tierflow::events", "{}", message),
                LogLevel::Info => tracing::info!(target: "tierflow::events", "{}", message),
                LogLevel::Warning => tracing::warn!(target: "tierflow::events", "{}", message),
                LogLevel::Error => tracing::error!(target: "tierflow::events", "{}", message),
            }
        }

        self.send(PipelineEvent::Log { level, message });
    }

    /// Report overall progress; values above 100 are clamped
    pub fn emit_progress(&self, percent: u8, message: impl Into<String>) {
        self.send(PipelineEvent::Progress {
            percent: percent.min(100),
            message: message.into(),
        });
    }

    pub fn emit_stage_started(&self, name: &str, description: &str) {
        self.send(PipelineEvent::StageStarted {
            name: name.to_string(),
            description: description.to_string(),
        });
    }

    pub fn emit_stage_completed(&self, name: &str, success: bool, duration: Duration) {
        self.send(PipelineEvent::StageCompleted {
            name: name.to_string(),
            success,
            duration_secs: duration.as_secs_f64(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit_log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit_log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit_log(LogLevel::Error, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit_log(LogLevel::Debug, message);
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::tracing_only()
    }
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every event that is ready
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Percentage of `done` out of `total`, rounded down
pub fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
