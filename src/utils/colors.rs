// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::Colorize;

use crate::pipeline::LogLevel;

/// Render a run log line with a colored level tag
pub fn format_log(level: LogLevel, message: &str) -> String {
    let tag = format!("{:<7}", level.to_string());
    let tag = match level {
        LogLevel::Debug => tag.dimmed(),
        LogLevel::Info => tag.blue(),
        LogLevel::Warning => tag.yellow(),
        LogLevel::Error => tag.red().bold(),
    };

    match level {
        LogLevel::Debug => format!("{} {}", tag, message.dimmed()),
        _ => format!("{} {}", tag, message),
    }
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

/// Print an info item
pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}
