// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Lifecycle event bus
//!
//! Listeners are called synchronously, in subscription order, on the task
//! that sends the message. A panicking listener is reported through
//! `tracing` and does not stop the others.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use crate::errors::RexError;
use crate::pipeline::{MissingDependency, UnitKind};
use crate::runtime::{Status, UnitResult};

/// Severity of a log message, most severe first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        Self::Fatal,
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Debug,
        Self::Trace,
    ];

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(Self::Trace)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown log level: {}", s))
    }
}

/// A lifecycle or log message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// A unit began running
    Started {
        unit: UnitKind,
        id: String,
        name: String,
    },
    /// A unit reached a terminal status
    Finished { unit: UnitKind, result: UnitResult },
    /// Units need ids that are not in the graph
    MissingDependencies {
        unit: UnitKind,
        missing: Vec<MissingDependency>,
    },
    /// Units that are members of a dependency cycle
    CyclicalReferences { unit: UnitKind, ids: Vec<String> },
    /// Free-form log line
    Log {
        level: LogLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Message {
    pub fn finished(unit: UnitKind, result: UnitResult) -> Self {
        Self::Finished { unit, result }
    }

    /// Message kind as listeners see it, e.g. `task:completed` or
    /// `jobs:missing-dependencies`
    pub fn kind(&self) -> String {
        match self {
            Self::Started { unit, .. } => format!("{}:started", unit.singular()),
            Self::Finished { unit, result } => {
                let outcome = match result.status() {
                    Status::Success => "completed",
                    Status::Failure => "failed",
                    Status::Skipped => "skipped",
                    Status::Cancelled => "cancelled",
                    Status::Pending | Status::Running => "finished",
                };
                format!("{}:{}", unit.singular(), outcome)
            }
            Self::MissingDependencies { unit, .. } => {
                format!("{}:missing-dependencies", unit.plural())
            }
            Self::CyclicalReferences { unit, .. } => {
                format!("{}:cyclical-references", unit.plural())
            }
            Self::Log { level, .. } if *level <= LogLevel::Error => "error".to_string(),
            Self::Log { .. } => "log".to_string(),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Message) + Send + Sync>;

struct BusInner {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    level: AtomicU8,
}

/// Per-run publish/subscribe bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("level", &self.level())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                level: AtomicU8::new(LogLevel::default() as u8),
            }),
        }
    }

    /// Add a listener; it sees every message sent after this call
    pub fn subscribe(&self, listener: impl Fn(&Message) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Deliver a message to every listener
    pub fn send(&self, message: &Message) {
        // Snapshot so listeners may subscribe or unsubscribe while running
        let listeners: Vec<(ListenerId, Listener)> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(message))).is_err() {
                tracing::warn!(listener = id.0, kind = %message.kind(), "bus listener panicked");
            }
        }
    }

    /// Most verbose level still delivered
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    /// Log lazily: `message` is only built when `level` is enabled
    pub fn log_with(&self, level: LogLevel, message: impl FnOnce() -> String) {
        if self.enabled(level) {
            self.send(&Message::Log {
                level,
                message: message(),
                error: None,
            });
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with(level, || message.into());
    }

    fn log_error(&self, level: LogLevel, error: &RexError, message: impl Into<String>) {
        if self.enabled(level) {
            self.send(&Message::Log {
                level,
                message: message.into(),
                error: Some(error.to_string()),
            });
        }
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    pub fn fatal_with(&self, error: &RexError, message: impl Into<String>) {
        self.log_error(LogLevel::Fatal, error, message);
    }

    pub fn error_with(&self, error: &RexError, message: impl Into<String>) {
        self.log_error(LogLevel::Error, error, message);
    }

    pub fn warn_with(&self, error: &RexError, message: impl Into<String>) {
        self.log_error(LogLevel::Warn, error, message);
    }
}

/// Listener forwarding every message to `tracing`
pub fn tracing_listener() -> impl Fn(&Message) + Send + Sync + 'static {
    |message: &Message| match message {
        Message::Started { id, name, .. } => {
            tracing::info!(kind = %message.kind(), %id, "{}", name)
        }
        Message::Finished { result, .. } => match result.status() {
            Status::Failure => tracing::warn!(
                kind = %message.kind(),
                id = %result.id,
                error = result.error.as_deref().unwrap_or_default()
            ),
            _ => tracing::info!(kind = %message.kind(), id = %result.id),
        },
        Message::MissingDependencies { missing, .. } => {
            for entry in missing {
                tracing::warn!(kind = %message.kind(), id = %entry.id, missing = ?entry.missing);
            }
        }
        Message::CyclicalReferences { ids, .. } => {
            tracing::warn!(kind = %message.kind(), ids = ?ids)
        }
        Message::Log {
            level,
            message: text,
            error,
        } => match level {
            LogLevel::Fatal | LogLevel::Error => tracing::error!(error = ?error, "{}", text),
            LogLevel::Warn => tracing::warn!(error = ?error, "{}", text),
            LogLevel::Info => tracing::info!("{}", text),
            LogLevel::Debug => tracing::debug!("{}", text),
            LogLevel::Trace => tracing::trace!("{}", text),
        },
    }
}
