// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! Graph command - visualize units as a dependency graph

use miette::Result;
use std::path::Path;

use super::{load_rexfile, GraphFormat, GraphKind};
use crate::errors::RexResult;
use crate::pipeline::{DependencyGraph, GraphNode, Rexfile, UnitKind};

/// Run the graph command
pub async fn run(rexfile_path: &Path, kind: GraphKind, format: GraphFormat, _verbose: bool) -> Result<()> {
    let rexfile = load_rexfile(rexfile_path)?;

    println!("{}", render(&rexfile, kind.0, format)?);

    Ok(())
}

/// Render the graph of one unit kind
pub fn render(rexfile: &Rexfile, kind: UnitKind, format: GraphFormat) -> RexResult<String> {
    match kind {
        UnitKind::Task => render_graph(&rexfile.task_graph()?, format),
        UnitKind::Job => render_graph(&rexfile.job_graph()?, format),
        UnitKind::Deployment => render_graph(&rexfile.deployment_graph()?, format),
    }
}

fn render_graph<N: GraphNode>(graph: &DependencyGraph<N>, format: GraphFormat) -> RexResult<String> {
    Ok(match format {
        GraphFormat::Text => graph.to_text()?,
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    })
}
