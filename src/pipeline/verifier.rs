// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Output contract verification

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::events::EventSender;
use crate::pipeline::{template, StageSpec};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A declared output found on disk after its stage returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedArtifact {
    /// Key later stages bind to
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl VerifiedArtifact {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// Required outputs missing after a stage returned success
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("required output(s) not generated: {}", format_paths(.missing))]
pub struct OutputViolation {
    pub missing: Vec<PathBuf>,
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks a stage's declared outputs against the filesystem
pub struct OutputVerifier;

impl OutputVerifier {
    /// Check every declared output of `stage`.
    ///
    /// All outputs are inspected before deciding, so a violation lists every
    /// missing required path rather than the first one.
    pub fn verify(
        stage: &StageSpec,
        output_root: &Path,
        events: &EventSender,
    ) -> Result<Vec<VerifiedArtifact>, OutputViolation> {
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for output in &stage.outputs {
            let path = template::render(&output.path_template, output_root);

            match artifact_size(&path) {
                Some(size_bytes) => {
                    let artifact = VerifiedArtifact {
                        key: output.key(),
                        path,
                        size_bytes,
                    };
                    events.info(format!(
                        "  ✓ Output generated: {} ({:.2} MB)",
                        display_name(&artifact.path),
                        artifact.size_mb()
                    ));
                    found.push(artifact);
                }
                None if output.required => {
                    events.error(format!("  ✗ Required output missing: {}", path.display()));
                    missing.push(path);
                }
                None => {
                    events.warning(format!("  ⚠ Optional output not generated: {}", path.display()));
                }
            }
        }

        if missing.is_empty() {
            Ok(found)
        } else {
            Err(OutputViolation { missing })
        }
    }
}

/// Size of a file, or of a directory's direct file entries
fn artifact_size(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.is_file() {
        return Some(meta.len());
    }

    let entries = std::fs::read_dir(path).ok()?;
    Some(
        entries
            .filter_map(Result::ok)
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum(),
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
