// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Graph command - show the data flow between stages

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::pipeline::{DataFlowGraph, PipelineDefinition};

/// Run the graph command
pub async fn run(definition_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let definition = PipelineDefinition::from_file(&definition_path)?;
    let graph = DataFlowGraph::build(&definition)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
