// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Output sinks
//!
//! Handlers write through an [`OutputSink`]. Every sink masks registered
//! secrets at write time, so text written before a secret was registered
//! stays as it was. Text that leaves a unit some other way (outputs, error
//! messages, the JSON summary) goes through [`OutputSink::redact`].

mod console;
mod memory;

pub use console::ConsoleSink;
pub use memory::MemorySink;

use regex::Regex;
use std::borrow::Cow;
use std::sync::RwLock;

use crate::events::LogLevel;

/// Replacement text for masked secrets
pub const MASK: &str = "***";

/// Write-only destination for unit output
pub trait OutputSink: Send + Sync {
    /// Write text without a trailing newline
    fn write(&self, text: &str);

    fn write_line(&self, line: &str);

    /// Write to the error stream
    fn error(&self, line: &str);

    fn log(&self, level: LogLevel, message: &str);

    /// Open a collapsible group of output
    fn group_start(&self, title: &str);

    fn group_end(&self);

    /// Register a secret; later writes replace it with [`MASK`]
    fn mask(&self, secret: &str);

    /// `text` with every secret registered so far replaced by [`MASK`]
    fn redact(&self, text: &str) -> String;
}

#[derive(Debug, Default)]
struct MaskState {
    secrets: Vec<String>,
    pattern: Option<Regex>,
}

/// Replaces registered secret values in text
#[derive(Debug, Default)]
pub struct SecretMasker {
    state: RwLock<MaskState>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret value. Empty values are ignored.
    pub fn add(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }

        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.secrets.iter().any(|s| s == secret) {
            return;
        }

        state.secrets.push(secret.to_string());
        // Longest first so a secret containing another is masked whole
        state.secrets.sort_by(|a, b| b.len().cmp(&a.len()));

        let alternation = state
            .secrets
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");

        state.pattern = match Regex::new(&alternation) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build secret mask pattern");
                None
            }
        };
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .secrets
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mask every registered secret in `text`
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match &state.pattern {
            Some(re) => re.replace_all(text, MASK),
            None => Cow::Borrowed(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_registered_secrets() {
        let masker = SecretMasker::new();
        assert_eq!(masker.apply("token=abc"), "token=abc");

        masker.add("abc");
        masker.add("abc");
        masker.add("");
        assert_eq!(masker.len(), 1);

        assert_eq!(masker.apply("token=abc, again abc"), "token=***, again ***");
    }

    #[test]
    fn test_longest_secret_wins() {
        let masker = SecretMasker::new();
        masker.add("pass");
        masker.add("password123");

        assert_eq!(masker.apply("password123 / pass"), "*** / ***");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let masker = SecretMasker::new();
        masker.add("a.b*c");

        assert_eq!(masker.apply("axbbc a.b*c"), "axbbc ***");
    }
}
