// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Console reporting of bus messages and run summaries

use colored::Colorize;
use std::sync::Arc;

use crate::errors::RecoverySuggestion;
use crate::events::{LogLevel, Message};
use crate::output::ConsoleSink;
use crate::pipeline::{RunSummary, UnitKind};
use crate::runtime::{Status, UnitResult};
use crate::utils::{duration_of, status_glyph};

/// Listener printing unit lifecycle and log messages to stderr
pub fn console_listener(sink: Arc<ConsoleSink>) -> impl Fn(&Message) + Send + Sync + 'static {
    move |message: &Message| {
        if let Some(line) = render_message(message) {
            sink.status(&line);
        }
    }
}

/// One line for a bus message, or `None` when it is not worth printing
pub fn render_message(message: &Message) -> Option<String> {
    match message {
        Message::Started { unit, name, .. } => {
            Some(format!("{} {} {}", "▶".blue(), unit.singular().dimmed(), name.bold()))
        }
        Message::Finished { unit, result } => Some(render_result(*unit, result)),
        Message::MissingDependencies { missing, .. } => Some(
            missing
                .iter()
                .map(|m| {
                    format!(
                        "{} '{}' needs unknown {}",
                        "✗".red(),
                        m.id,
                        m.missing.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Message::CyclicalReferences { ids, .. } => Some(format!(
            "{} Circular dependency: {}",
            "✗".red(),
            ids.join(" → ")
        )),
        Message::Log {
            level,
            message,
            error,
        } => {
            let text = match error {
                Some(error) => format!("{}: {}", message, error),
                None => message.clone(),
            };
            Some(match level {
                LogLevel::Fatal | LogLevel::Error => format!("{} {}", "error:".red().bold(), text),
                LogLevel::Warn => format!("{} {}", "warning:".yellow().bold(), text),
                _ => format!("{}", text.dimmed()),
            })
        }
    }
}

fn render_result(unit: UnitKind, result: &UnitResult) -> String {
    let mut line = format!(
        "{} {} {}",
        status_glyph(result.status()),
        unit.singular().dimmed(),
        result.id.bold()
    );

    if let Some(elapsed) = duration_of(result) {
        line.push_str(&format!(" {}", format!("({:.2}s)", elapsed.as_secs_f64()).dimmed()));
    }

    if let Some(error) = &result.error {
        line.push_str(&format!(": {}", error));
    }

    line
}

/// Print the closing lines of a run
pub fn print_summary(summary: &RunSummary) {
    let counts: Vec<String> = [
        (Status::Success, "succeeded"),
        (Status::Failure, "failed"),
        (Status::Skipped, "skipped"),
        (Status::Cancelled, "cancelled"),
    ]
    .iter()
    .filter_map(|(status, label)| {
        let n = summary.count(*status);
        (n > 0).then(|| format!("{} {}", n, label))
    })
    .collect();

    println!();
    let headline = match summary.status {
        Status::Success => "Run succeeded".green().bold(),
        Status::Cancelled => "Run cancelled".yellow().bold(),
        _ => "Run failed".red().bold(),
    };
    if counts.is_empty() {
        println!("{}", headline);
    } else {
        println!("{} ({})", headline, counts.join(", "));
    }

    if let Some(error) = &summary.error {
        if let Some(suggestion) = RecoverySuggestion::for_error(error) {
            eprintln!();
            eprint!("{}", suggestion);
        }
    }
}
