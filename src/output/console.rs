// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Colored terminal sink

use colored::Colorize;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{OutputSink, SecretMasker};
use crate::events::LogLevel;

/// Sink writing to stdout/stderr
#[derive(Debug, Default)]
pub struct ConsoleSink {
    masker: SecretMasker,
    depth: AtomicUsize,
    quiet: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress stdout; errors still go to stderr
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Print a status line to stderr with secrets masked
    pub fn status(&self, line: &str) {
        eprintln!("{}", self.masker.apply(line));
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth.load(Ordering::Relaxed))
    }
}

impl OutputSink for ConsoleSink {
    fn write(&self, text: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", self.masker.apply(text));
        let _ = stdout.flush();
    }

    fn write_line(&self, line: &str) {
        if !self.quiet {
            println!("{}{}", self.indent(), self.masker.apply(line));
        }
    }

    fn error(&self, line: &str) {
        eprintln!("{}{}", self.indent(), self.masker.apply(line).red());
    }

    fn log(&self, level: LogLevel, message: &str) {
        let message = self.masker.apply(message);
        let tag = format!("[{}]", level);
        match level {
            LogLevel::Fatal | LogLevel::Error => {
                eprintln!("{}{} {}", self.indent(), tag.red().bold(), message)
            }
            LogLevel::Warn if !self.quiet => {
                println!("{}{} {}", self.indent(), tag.yellow(), message)
            }
            LogLevel::Info if !self.quiet => {
                println!("{}{} {}", self.indent(), tag.blue(), message)
            }
            _ if !self.quiet => println!("{}{} {}", self.indent(), tag.dimmed(), message.dimmed()),
            _ => {}
        }
    }

    fn group_start(&self, title: &str) {
        if !self.quiet {
            println!("{}{} {}", self.indent(), "▸".cyan(), self.masker.apply(title).bold());
        }
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn group_end(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
    }

    fn mask(&self, secret: &str) {
        self.masker.add(secret);
    }

    fn redact(&self, text: &str) -> String {
        self.masker.apply(text).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_depth_never_underflows() {
        let sink = ConsoleSink::new().quiet(true);
        sink.group_end();
        assert_eq!(sink.indent(), "");

        sink.group_start("outer");
        sink.group_start("inner");
        assert_eq!(sink.indent(), "    ");
        sink.group_end();
        sink.group_end();
        sink.group_end();
        assert_eq!(sink.indent(), "");
    }

    #[test]
    fn test_redact_uses_registered_secrets() {
        let sink = ConsoleSink::new().quiet(true);
        assert_eq!(sink.redact(r#"{"stdout": "pw=hunter2"}"#), r#"{"stdout": "pw=hunter2"}"#);

        sink.mask("hunter2");
        assert_eq!(sink.redact(r#"{"stdout": "pw=hunter2"}"#), r#"{"stdout": "pw=***"}"#);
    }
}
