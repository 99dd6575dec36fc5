// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Stage and run results

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

use crate::pipeline::VerifiedArtifact;

/// Maximum number of trace lines kept in an [`ErrorDetail`]
pub const TRACEBACK_LIMIT: usize = 8;

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome class of an attempted stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The unit returned a value and every required output exists
    Success,
    /// The unit returned normally but reported failure
    SoftFailure,
    /// The unit raised an error, or an output contract was violated
    HardFailure,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SoftFailure => write!(f, "soft failure"),
            Self::HardFailure => write!(f, "hard failure"),
        }
    }
}

/// Technical context of a stage failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub stage_name: String,
    /// 1-based position of the stage
    pub stage_index: usize,
    pub total_stages: usize,
    pub unit_location: String,
    /// Error type name; absent for self-reported failures
    pub exception_type: Option<String>,
    pub message: String,
    /// Last non-blank trace lines, at most [`TRACEBACK_LIMIT`]
    pub traceback_excerpt: Vec<String>,
}

impl ErrorDetail {
    /// One-line description for terminal output
    pub fn summary(&self) -> String {
        match &self.exception_type {
            Some(kind) => format!(
                "Stage {}/{} '{}' failed ({}): {}",
                self.stage_index, self.total_stages, self.stage_name, kind, self.message
            ),
            None => format!(
                "Stage {}/{} '{}' reported failure: {}",
                self.stage_index, self.total_stages, self.stage_name, self.message
            ),
        }
    }
}

/// Keep the last non-blank lines of a trace, at most [`TRACEBACK_LIMIT`]
pub fn trace_excerpt<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let non_blank: Vec<&str> = lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| !line.trim().is_empty())
        .collect();

    let skip = non_blank.len().saturating_sub(TRACEBACK_LIMIT);
    non_blank[skip..].iter().map(|l| l.to_string()).collect()
}

/// Result of one attempted stage
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Value the unit returned, if it returned one
    pub raw_return_value: Option<Value>,
    /// Declared outputs found on disk
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<VerifiedArtifact>,
    /// Present iff the stage did not succeed
    pub error_detail: Option<ErrorDetail>,
}

impl StageResult {
    pub fn success(
        stage_name: impl Into<String>,
        duration: Duration,
        value: Value,
        artifacts: Vec<VerifiedArtifact>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Success,
            duration,
            raw_return_value: Some(value),
            artifacts,
            error_detail: None,
        }
    }

    pub fn failure(
        status: StageStatus,
        duration: Duration,
        raw_return_value: Option<Value>,
        detail: ErrorDetail,
    ) -> Self {
        debug_assert!(status != StageStatus::Success);
        Self {
            stage_name: detail.stage_name.clone(),
            status,
            duration,
            raw_return_value,
            artifacts: Vec::new(),
            error_detail: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    /// Find a verified artifact by output key
    pub fn artifact(&self, key: &str) -> Option<&VerifiedArtifact> {
        self.artifacts.iter().find(|a| a.key == key)
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Pipeline id, when the definition could be loaded
    pub pipeline_id: Option<String>,
    pub success: bool,
    /// Number of stages whose status is `success`
    pub completed_stages: usize,
    pub total_stages: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Attempted stages in execution order
    pub stage_results: Vec<StageResult>,
    /// Short human-readable summary of what went wrong
    pub error: Option<String>,
    /// The first stage failure
    pub error_detail: Option<ErrorDetail>,
    /// Every stage failure, in execution order
    pub failed_stages: Vec<ErrorDetail>,
}

impl RunResult {
    /// A run that ended before any stage was attempted
    pub fn aborted(
        pipeline_id: Option<String>,
        total_stages: usize,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_id,
            success: false,
            completed_stages: 0,
            total_stages,
            duration,
            stage_results: Vec::new(),
            error: Some(error.into()),
            error_detail: None,
            failed_stages: Vec::new(),
        }
    }

    /// Look up an attempted stage
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage_name == name)
    }

    /// Names of attempted stages in execution order
    pub fn attempted_stages(&self) -> Vec<&str> {
        self.stage_results.iter().map(|r| r.stage_name.as_str()).collect()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(kind: Option<&str>) -> ErrorDetail {
        ErrorDetail {
            stage_name: "gold".into(),
            stage_index: 2,
            total_stages: 3,
            unit_location: "practicantes.gold".into(),
            exception_type: kind.map(String::from),
            message: "missing column".into(),
            traceback_excerpt: vec![],
        }
    }

    #[test]
    fn test_trace_excerpt_caps_at_limit() {
        let lines: Vec<String> = (1..=12).map(|i| format!("frame {}", i)).collect();
        let excerpt = trace_excerpt(&lines[..]);

        assert_eq!(excerpt.len(), TRACEBACK_LIMIT);
        assert_eq!(excerpt.first().unwrap(), "frame 5");
        assert_eq!(excerpt.last().unwrap(), "frame 12");
    }

    #[test]
    fn test_trace_excerpt_drops_blank_lines() {
        let excerpt = trace_excerpt(&["a", "", "  ", "b"]);
        assert_eq!(excerpt, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_summary_mentions_type_only_when_raised() {
        assert_eq!(
            detail(Some("InvalidInputError")).summary(),
            "Stage 2/3 'gold' failed (InvalidInputError): missing column"
        );
        assert_eq!(
            detail(None).summary(),
            "Stage 2/3 'gold' reported failure: missing column"
        );
    }

    #[test]
    fn test_run_result_json_shape() {
        let result = RunResult {
            pipeline_id: Some("p".into()),
            success: false,
            completed_stages: 1,
            total_stages: 2,
            duration: Duration::from_millis(1500),
            stage_results: vec![
                StageResult::success("silver", Duration::from_millis(500), Value::Null, vec![]),
                StageResult::failure(
                    StageStatus::SoftFailure,
                    Duration::from_secs(1),
                    None,
                    detail(None),
                ),
            ],
            error: Some("Error in stage: gold".into()),
            error_detail: Some(detail(None)),
            failed_stages: vec![detail(None)],
        };

        let json: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["duration"], 1.5);
        assert_eq!(json["stage_results"][0]["status"], "success");
        assert_eq!(json["stage_results"][1]["status"], "soft_failure");
        assert_eq!(json["failed_stages"][0]["exception_type"], Value::Null);
        assert_eq!(result.attempted_stages(), vec!["silver", "gold"]);
    }
}
