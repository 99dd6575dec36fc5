// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Units command - list registered stage units

use colored::Colorize;
use miette::Result;

use crate::units::UnitRegistry;
use crate::utils;

/// Run the units command
pub async fn run(verbose: bool) -> Result<()> {
    let registry = UnitRegistry::with_builtins();

    utils::print_header("Registered stage units");

    let spinner = utils::create_spinner("Checking unit availability...");
    let mut rows = Vec::with_capacity(registry.len());
    for (key, unit) in registry.iter() {
        rows.push((key.to_string(), unit.describe().to_string(), unit.check_available().await));
    }
    spinner.finish_and_clear();

    for (key, description, available) in rows {
        let line = if description.is_empty() {
            key.bold().to_string()
        } else {
            format!("{} {}", key.bold(), format!("- {}", description).dimmed())
        };

        if available {
            utils::print_success(&line);
        } else {
            utils::print_warning(&format!("{} {}", line, "(not available on this machine)".yellow()));
        }
    }

    if verbose {
        println!();
        utils::print_info("Hosts embedding tierflow can register more units with UnitRegistry::register");
    }

    Ok(())
}
