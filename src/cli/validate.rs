// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Validate command - check a pipeline definition

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{DataFlowGraph, DefinitionValidator, PipelineDefinition};
use crate::units::UnitRegistry;
use crate::utils;

/// Run the validate command
pub async fn run(definition_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let definition = match PipelineDefinition::from_file(&definition_path) {
        Ok(d) => d,
        Err(e) => {
            utils::print_error("Failed to parse pipeline definition");
            eprintln!();
            return Err(e.into());
        }
    };

    utils::print_success(&format!("{} parses", definition_path.display()));

    let structure = DefinitionValidator::validate(&definition);
    let units = DefinitionValidator::validate_units(&definition, &UnitRegistry::with_builtins());

    let errors: Vec<&String> = structure.errors.iter().collect();

    if !errors.is_empty() {
        utils::print_section(&"Errors".red().bold().to_string());
        for error in &errors {
            utils::print_error(error);
        }
    }

    // Units may be registered by an embedding host, so these only warn here
    let warnings: Vec<&String> = structure.warnings.iter().chain(units.errors.iter()).collect();

    if !warnings.is_empty() {
        utils::print_section(&"Warnings".yellow().bold().to_string());
        for warning in &warnings {
            utils::print_warning(warning);
        }
    }

    if verbose && errors.is_empty() {
        utils::print_section("Pipeline summary");
        println!("  Id: {}", definition.id);
        println!("  Name: {}", definition.display_name);
        println!("  Version: {}", definition.version);
        println!("  Stop on error: {}", definition.config.stop_on_error);
        println!();
        if let Ok(graph) = DataFlowGraph::build(&definition) {
            for line in graph.to_text().lines() {
                println!("  {}", line);
            }
        }
    }

    println!();

    if !errors.is_empty() {
        Err(miette::miette!("Pipeline validation failed"))
    } else if !warnings.is_empty() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
