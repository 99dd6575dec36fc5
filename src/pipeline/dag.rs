// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Data-flow graph of a pipeline
//!
//! Stages still run in the order they are listed. The graph records which
//! stage feeds which, so references to unknown or later stages are caught
//! before a run starts, and so the pipeline can be rendered.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

use crate::errors::{TierflowError, TierflowResult};
use crate::pipeline::{InputSource, PipelineDefinition};

/// Why one stage depends on another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEdge {
    /// A declared `from_stage` input
    Input { parameter: String, output_key: String },
    /// Implicit hand-off to the next stage when no inputs are declared
    Positional,
}

impl DataEdge {
    fn label(&self) -> String {
        match self {
            Self::Input { parameter, output_key } => format!("{} → {}", output_key, parameter),
            Self::Positional => "(positional)".to_string(),
        }
    }
}

/// Stage dependency graph
pub struct DataFlowGraph {
    graph: DiGraph<usize, DataEdge>,
    names: Vec<String>,
    units: Vec<String>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl DataFlowGraph {
    /// Build the graph of a definition.
    ///
    /// Fails on the first input that names an unknown stage, or a stage that
    /// is not listed before the one reading from it.
    pub fn build(definition: &PipelineDefinition) -> TierflowResult<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (idx, stage) in definition.stages.iter().enumerate() {
            let node = graph.add_node(idx);
            name_to_index.entry(stage.name.clone()).or_insert(node);
        }

        for (idx, stage) in definition.stages.iter().enumerate() {
            let node = NodeIndex::new(idx);

            if stage.inputs.is_empty() {
                if idx > 0 {
                    graph.add_edge(NodeIndex::new(idx - 1), node, DataEdge::Positional);
                }
                continue;
            }

            for (parameter, source) in &stage.inputs {
                let InputSource::FromStage { from_stage, output_key } = source else {
                    continue;
                };

                let dep = *name_to_index
                    .get(from_stage)
                    .ok_or_else(|| TierflowError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: from_stage.clone(),
                    })?;

                if dep.index() >= idx {
                    return Err(TierflowError::ForwardReference {
                        stage: stage.name.clone(),
                        dependency: from_stage.clone(),
                    });
                }

                graph.add_edge(
                    dep,
                    node,
                    DataEdge::Input {
                        parameter: parameter.clone(),
                        output_key: output_key.clone(),
                    },
                );
            }
        }

        Ok(Self {
            graph,
            names: definition.stages.iter().map(|s| s.name.clone()).collect(),
            units: definition.stages.iter().map(|s| s.unit.clone()).collect(),
            name_to_index,
        })
    }

    /// Stages that feed `stage_name` directly
    pub fn upstream(&self, stage_name: &str) -> Option<Vec<&str>> {
        self.neighbors(stage_name, Direction::Incoming)
    }

    /// Stages fed by `stage_name` directly
    pub fn downstream(&self, stage_name: &str) -> Option<Vec<&str>> {
        self.neighbors(stage_name, Direction::Outgoing)
    }

    fn neighbors(&self, stage_name: &str, direction: Direction) -> Option<Vec<&str>> {
        let node = self.name_to_index.get(stage_name)?;
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.names[self.graph[n]].as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        Some(names)
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(stage_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(stage_b) else {
            return false;
        };

        node_a != node_b && petgraph::algo::has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Edges into a stage, in declaration order
    fn incoming(&self, idx: usize) -> Vec<(usize, &DataEdge)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(NodeIndex::new(idx), Direction::Incoming)
            .map(|e| (e.id().index(), self.graph[e.source()], e.weight()))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, from, weight)| (from, weight)).collect()
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (idx, name) in self.names.iter().enumerate() {
            out.push_str(&format!("    s{}[\"{}\"]\n", idx, name));
        }

        for idx in 0..self.names.len() {
            for (from, edge) in self.incoming(idx) {
                match edge {
                    DataEdge::Positional => out.push_str(&format!("    s{} -.-> s{}\n", from, idx)),
                    _ => out.push_str(&format!("    s{} -->|\"{}\"| s{}\n", from, edge.label(), idx)),
                }
            }
        }

        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for name in &self.names {
            out.push_str(&format!("    \"{}\";\n", name));
        }

        for idx in 0..self.names.len() {
            for (from, edge) in self.incoming(idx) {
                let attrs = match edge {
                    DataEdge::Positional => "style=dashed".to_string(),
                    _ => format!("label=\"{}\"", edge.label()),
                };
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [{}];\n",
                    self.names[from], self.names[idx], attrs
                ));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of the execution order
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for (idx, name) in self.names.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})", idx + 1, name, self.units[idx]));

            let reads: Vec<String> = self
                .incoming(idx)
                .into_iter()
                .map(|(from, edge)| match edge {
                    DataEdge::Positional => format!("{} (positional)", self.names[from]),
                    DataEdge::Input { parameter, output_key } => {
                        format!("{}.{} as {}", self.names[from], output_key, parameter)
                    }
                })
                .collect();

            if !reads.is_empty() {
                out.push_str(&format!(" [reads: {}]", reads.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}
