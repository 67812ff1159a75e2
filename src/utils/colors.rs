// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::runtime::Status;

/// One-character marker for a status
pub fn status_glyph(status: Status) -> ColoredString {
    match status {
        Status::Success => "✓".green(),
        Status::Failure => "✗".red(),
        Status::Skipped => "-".dimmed(),
        Status::Cancelled => "⊘".yellow(),
        Status::Running => "▶".blue(),
        Status::Pending => "·".dimmed(),
    }
}

/// Status name colored by outcome
pub fn status_label(status: Status) -> ColoredString {
    let name = status.to_string();
    match status {
        Status::Success => name.green(),
        Status::Failure => name.red(),
        Status::Cancelled => name.yellow(),
        _ => name.dimmed(),
    }
}

/// Style for code/commands
pub fn code(msg: &str) -> ColoredString {
    msg.cyan()
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_glyph_plain() {
        colored::control::set_override(false);
        assert_eq!(status_glyph(Status::Success).to_string(), "✓");
        assert_eq!(status_glyph(Status::Cancelled).to_string(), "⊘");
        assert_eq!(status_label(Status::Failure).to_string(), "failure");
    }
}
