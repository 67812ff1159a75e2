// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! In-memory sink that captures output lines

use std::sync::Mutex;

use super::{OutputSink, SecretMasker};
use crate::events::LogLevel;

#[derive(Debug, Default)]
struct Buffer {
    lines: Vec<String>,
    partial: String,
}

/// Sink that keeps every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    masker: SecretMasker,
    buffer: Mutex<Buffer>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured lines, including an unterminated trailing line
    pub fn lines(&self) -> Vec<String> {
        let buffer = self.lock();
        let mut lines = buffer.lines.clone();
        if !buffer.partial.is_empty() {
            lines.push(buffer.partial.clone());
        }
        lines
    }

    /// Everything captured, newline separated
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_line(&self, line: String) {
        let mut buffer = self.lock();
        let mut full = std::mem::take(&mut buffer.partial);
        full.push_str(&line);
        buffer.lines.push(full);
    }
}

impl OutputSink for MemorySink {
    fn write(&self, text: &str) {
        let masked = self.masker.apply(text).into_owned();
        self.lock().partial.push_str(&masked);
    }

    fn write_line(&self, line: &str) {
        self.push_line(self.masker.apply(line).into_owned());
    }

    fn error(&self, line: &str) {
        self.push_line(format!("error: {}", self.masker.apply(line)));
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.push_line(format!("[{}] {}", level, self.masker.apply(message)));
    }

    fn group_start(&self, title: &str) {
        self.push_line(format!("::group::{}", self.masker.apply(title)));
    }

    fn group_end(&self) {
        self.push_line("::endgroup::".to_string());
    }

    fn mask(&self, secret: &str) {
        self.masker.add(secret);
    }

    fn redact(&self, text: &str) -> String {
        self.masker.apply(text).into_owned()
    }
}
