// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Path templates
//!
//! Output paths, preconditions and static parameters may mention the run's
//! output root through the `${output_dir}` token.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// The substitution token for the run's output root
pub const OUTPUT_DIR_TOKEN: &str = "${output_dir}";

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("token pattern is valid"))
}

/// Substitute the output root into a template string
pub fn render_str(template: &str, output_root: &Path) -> String {
    template.replace(OUTPUT_DIR_TOKEN, &output_root.to_string_lossy())
}

/// Substitute the output root into a path template
pub fn render(template: &str, output_root: &Path) -> PathBuf {
    PathBuf::from(render_str(template, output_root))
}

/// Whether the template mentions the output root
pub fn uses_output_dir(template: &str) -> bool {
    template.contains(OUTPUT_DIR_TOKEN)
}

/// Tokens other than `${output_dir}`, which are left untouched by [`render`]
pub fn unknown_tokens(template: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| *name != "output_dir")
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_output_root() {
        let path = render("${output_dir}/silver/nomina.parquet", Path::new("/data/run"));
        assert_eq!(path, PathBuf::from("/data/run/silver/nomina.parquet"));
    }

    #[test]
    fn test_render_without_token_is_unchanged() {
        assert_eq!(render_str("static/path.xlsx", Path::new("/x")), "static/path.xlsx");
        assert!(!uses_output_dir("static/path.xlsx"));
    }

    #[test]
    fn test_unknown_tokens() {
        let tokens = unknown_tokens("${output_dir}/${period}/${ output_dir}");
        assert_eq!(tokens, vec!["period".to_string(), " output_dir".to_string()]);
        assert!(unknown_tokens("${output_dir}/gold").is_empty());
    }
}
