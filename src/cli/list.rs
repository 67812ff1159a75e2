// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! List command - show the units a rexfile defines

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::load_rexfile;
use crate::pipeline::{Rexfile, Unit};
use crate::utils::{code, print_header, print_section};

/// Run the list command
pub async fn run(rexfile_path: &Path, verbose: bool) -> Result<()> {
    let rexfile = load_rexfile(rexfile_path)?;

    print_header(rexfile.name.as_deref().unwrap_or("rexfile"));

    for (section, lines) in sections(&rexfile, verbose) {
        print_section(section);
        if lines.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for line in lines {
            println!("  {}", line);
        }
    }

    Ok(())
}

/// One line per unit, grouped by kind
fn sections(rexfile: &Rexfile, verbose: bool) -> Vec<(&'static str, Vec<String>)> {
    let tasks = rexfile
        .tasks
        .iter()
        .map(|t| describe(t, &t.uses, verbose))
        .collect();

    let jobs = rexfile
        .jobs
        .iter()
        .map(|j| {
            let mut line = describe(j, "job", verbose);
            line.push_str(&format!(" {}", format!("{} tasks", j.tasks.len()).dimmed()));
            line
        })
        .collect();

    let deployments = rexfile
        .deployments
        .iter()
        .map(|d| {
            let mut line = describe(d, &d.uses, verbose);
            if verbose && !d.hooks.is_empty() {
                let hooks: Vec<&str> = d.hooks.keys().map(String::as_str).collect();
                line.push_str(&format!(" [hooks: {}]", hooks.join(", ")).dimmed().to_string());
            }
            line
        })
        .collect();

    vec![("Tasks", tasks), ("Jobs", jobs), ("Deployments", deployments)]
}

fn describe<U: Unit>(unit: &U, uses: &str, verbose: bool) -> String {
    let spec = unit.spec();
    let mut line = format!("{} ({})", spec.id.bold(), code(uses));

    if !spec.needs.is_empty() {
        line.push_str(&format!(" [needs: {}]", spec.needs.join(", ")).dimmed().to_string());
    }

    if let Some(description) = &spec.description {
        line.push_str(&format!(" - {}", description));
    } else if verbose && spec.name.is_some() {
        line.push_str(&format!(" - {}", spec.display_name()));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections() {
        colored::control::set_override(false);
        let rexfile = Rexfile::from_yaml(
            r#"
tasks:
  - id: build
    uses: shell
    description: Compile everything
    with: { run: make }
  - id: test
    uses: shell
    needs: [build]
    with: { run: make test }
"#,
        )
        .unwrap();

        let sections = sections(&rexfile, false);

        assert_eq!(sections[0].0, "Tasks");
        assert_eq!(
            sections[0].1,
            vec![
                "build (shell) - Compile everything".to_string(),
                "test (shell) [needs: build]".to_string(),
            ]
        );
        assert!(sections[1].1.is_empty());
    }
}
