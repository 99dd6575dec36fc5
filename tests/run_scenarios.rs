// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! End-to-end runs through `PipelineExecutor`

use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use tierflow::pipeline::{
    events, CancelHandle, ExecutionOptions, PipelineEvent, PipelineExecutor, RunInputs, RunResult, StageStatus,
};
use tierflow::units::{fallible_fn, kinds, report_fn, FnUnit, StageOutcome, StageParams, StageUnit, UnitRegistry};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InvalidInputError(String);

/// Writes `silver/data.parquet` under the output root
fn silver_unit() -> FnUnit {
    FnUnit::new("writes silver/data.parquet", |params| {
        let dir = params.output_dir().unwrap().join("silver");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data.parquet"), b"rows").unwrap();
        Ok(json!({"success": true, "registros": 3}))
    })
}

fn registry() -> UnitRegistry {
    let mut registry = UnitRegistry::with_builtins();
    registry.register("silver", silver_unit());
    registry.register("noop", FnUnit::new("does nothing", |_| Ok(json!({"success": true}))));
    registry.register(
        "invalid_input",
        fallible_fn("raises", |_| {
            Err::<Value, _>(InvalidInputError("missing column".into()))
        }),
    );
    registry.register(
        "missing_column",
        report_fn("reports", |_| json!({"success": false, "error": "missing column"})),
    );
    registry.register(
        "reports_via_ok",
        FnUnit::new("returns a failure report as Ok", |_| {
            Ok(json!({"success": false, "error": "missing column"}))
        }),
    );
    registry.register(
        "echo",
        FnUnit::new("returns its params", |params| {
            Ok(serde_json::to_value(params).unwrap())
        }),
    );
    registry
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn definition(&self, yaml: &str) -> PathBuf {
        let path = self.dir.path().join("pipeline.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn output_root(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn run(&self, yaml: &str) -> RunResult {
        self.run_with(yaml, RunInputs::new(), ExecutionOptions::default()).await
    }

    async fn run_with(&self, yaml: &str, inputs: RunInputs, options: ExecutionOptions) -> RunResult {
        PipelineExecutor::new(self.definition(yaml), inputs, self.output_root("out"))
            .with_registry(registry())
            .with_options(options)
            .execute()
            .await
    }
}

/// A linear definition where every stage runs `units[i]`
fn linear(stop_on_error: bool, units: &[&str]) -> String {
    let mut yaml = format!(
        "id: linear\ndisplay_name: Linear\nconfig:\n  stop_on_error: {}\nstages:\n",
        stop_on_error
    );
    for (i, unit) in units.iter().enumerate() {
        yaml.push_str(&format!("  - name: stage{}\n    unit: {}\n", i + 1, unit));
    }
    yaml
}

#[tokio::test]
async fn scenario_a_raised_error_stops_the_run() {
    let ws = Workspace::new();
    let yaml = r#"
id: practicantes
display_name: Control de Practicantes
config:
  stop_on_error: true
stages:
  - name: silver
    unit: silver
    outputs:
      - path_template: "${output_dir}/silver/data.parquet"
        key: parquet
  - name: gold
    unit: invalid_input
    inputs:
      ruta_silver: { from_stage: silver, output_key: parquet }
"#;

    let result = ws.run(yaml).await;

    assert!(!result.success);
    assert_eq!(result.completed_stages, 1);
    assert_eq!(result.total_stages, 2);
    assert_eq!(result.stage_results.len(), 2);
    assert_eq!(result.error.as_deref(), Some("Error in stage: gold"));

    let detail = result.error_detail.as_ref().unwrap();
    assert_eq!(detail.stage_index, 2);
    assert_eq!(detail.exception_type.as_deref(), Some("InvalidInputError"));
    assert_eq!(detail.message, "missing column");
    assert_eq!(result.failed_stages.len(), 1);
}

#[tokio::test]
async fn scenario_b_soft_failure_continues() {
    let ws = Workspace::new();
    let result = ws.run(&linear(false, &["noop", "missing_column", "noop"])).await;

    assert!(!result.success);
    assert_eq!(result.stage_results.len(), 3);
    assert_eq!(result.attempted_stages(), vec!["stage1", "stage2", "stage3"]);

    // completed_stages counts stages whose status is success
    assert_eq!(result.completed_stages, 2);

    assert_eq!(result.failed_stages.len(), 1);
    assert_eq!(result.failed_stages[0].stage_name, "stage2");
    assert_eq!(result.failed_stages[0].exception_type, None);
    assert_eq!(result.stage("stage2").unwrap().status, StageStatus::SoftFailure);
    assert_eq!(result.stage("stage3").unwrap().status, StageStatus::Success);
    assert_eq!(result.error.as_deref(), Some("1 of 3 stages failed: stage2"));
}

#[tokio::test]
async fn scenario_c_output_contract_violation() {
    let ws = Workspace::new();
    let yaml = r#"
id: nomina
display_name: Nomina
stages:
  - name: gold
    unit: noop
    outputs:
      - path_template: "${output_dir}/gold/Planilla_Metso_Consolidado.parquet"
"#;

    let result = ws.run(yaml).await;
    let gold = result.stage("gold").unwrap();
    let detail = gold.error_detail.as_ref().unwrap();

    assert_eq!(gold.status, StageStatus::HardFailure);
    assert_eq!(gold.raw_return_value, Some(json!({"success": true})));
    assert_eq!(detail.exception_type.as_deref(), Some(kinds::OUTPUT_CONTRACT));
    assert!(detail.message.starts_with("output contract violation: "));
    assert!(detail.message.contains("Planilla_Metso_Consolidado.parquet"));

    let raised = ws.run(&linear(true, &["invalid_input"])).await;
    let raised_message = &raised.failed_stages[0].message;
    assert!(!raised_message.contains("output contract violation"));
}

#[tokio::test]
async fn stop_on_error_counts_stages_before_first_failure() {
    for total in 1..=4 {
        for failing in 1..=total {
            let units: Vec<&str> = (1..=total)
                .map(|i| if i == failing { "invalid_input" } else { "noop" })
                .collect();

            let ws = Workspace::new();
            let result = ws.run(&linear(true, &units)).await;

            assert!(!result.success);
            assert_eq!(result.completed_stages, failing - 1, "N={} k={}", total, failing);
            assert_eq!(result.stage_results.len(), failing, "N={} k={}", total, failing);
            assert!(result.failed_stages.len() <= 1);
        }
    }
}

#[tokio::test]
async fn continue_on_error_attempts_every_stage() {
    for mask in 0u8..8 {
        let units: Vec<&str> = (0..3)
            .map(|i| if mask & (1 << i) != 0 { "missing_column" } else { "noop" })
            .collect();

        let ws = Workspace::new();
        let result = ws.run(&linear(false, &units)).await;

        assert_eq!(result.success, result.failed_stages.is_empty(), "mask {:03b}", mask);
        assert_eq!(result.attempted_stages(), vec!["stage1", "stage2", "stage3"]);
        assert_eq!(result.failed_stages.len(), mask.count_ones() as usize);
    }
}

#[tokio::test]
async fn cli_override_beats_definition_policy() {
    let ws = Workspace::new();
    let options = ExecutionOptions {
        stop_on_error: Some(false),
        ..Default::default()
    };

    let result = ws
        .run_with(&linear(true, &["invalid_input", "noop"]), RunInputs::new(), options)
        .await;

    assert_eq!(result.stage_results.len(), 2);
    assert_eq!(result.completed_stages, 1);
}

#[tokio::test]
async fn raised_and_reported_failures_carry_the_same_message() {
    let ws = Workspace::new();
    let raised = ws.run(&linear(true, &["invalid_input"])).await;
    let reported = ws.run(&linear(true, &["missing_column"])).await;

    let raised = &raised.failed_stages[0];
    let reported = &reported.failed_stages[0];

    assert_eq!(raised.message, reported.message);
    assert_eq!(raised.exception_type.as_deref(), Some("InvalidInputError"));
    assert_eq!(reported.exception_type, None);
}

#[tokio::test]
async fn failure_report_returned_as_ok_is_soft() {
    let ws = Workspace::new();
    let result = ws.run(&linear(true, &["reports_via_ok", "noop"])).await;

    assert!(!result.success);
    assert_eq!(result.stage_results.len(), 1);
    assert_eq!(result.stage_results[0].status, StageStatus::SoftFailure);
    assert_eq!(result.failed_stages[0].message, "missing column");
    assert_eq!(result.failed_stages[0].exception_type, None);
}

#[tokio::test]
async fn repeated_runs_have_the_same_shape() {
    let ws = Workspace::new();
    let yaml = linear(false, &["silver", "missing_column", "noop"]);
    let path = ws.definition(&yaml);

    let mut shapes = Vec::new();
    for root in ["first", "second"] {
        let result = PipelineExecutor::new(&path, RunInputs::new(), ws.output_root(root))
            .with_registry(registry())
            .execute()
            .await;

        let statuses: Vec<(String, StageStatus)> = result
            .stage_results
            .iter()
            .map(|r| (r.stage_name.clone(), r.status))
            .collect();
        shapes.push((result.completed_stages, result.total_stages, statuses));
    }

    assert_eq!(shapes[0], shapes[1]);
}

#[tokio::test]
async fn load_failures_attempt_no_stage() {
    let ws = Workspace::new();

    let missing = PipelineExecutor::new(ws.dir.path().join("nope.yaml"), RunInputs::new(), ws.output_root("out"))
        .execute()
        .await;
    assert!(!missing.success);
    assert!(missing.stage_results.is_empty());
    assert_eq!(missing.pipeline_id, None);
    assert!(missing.error.unwrap().contains("not found"));

    let malformed = ws.run("id: [unclosed\nstages: {").await;
    assert!(!malformed.success);
    assert!(malformed.stage_results.is_empty());
    assert_eq!(malformed.completed_stages, 0);
}

#[tokio::test]
async fn failed_precondition_attempts_no_stage() {
    let ws = Workspace::new();
    let yaml = r#"
id: nomina
display_name: Nomina
preconditions:
  - path_template: "${output_dir}/licencias/CONTROL DE LICENCIAS.xlsx"
    kind: file
    description: "Leave control workbook"
stages:
  - { name: silver, unit: silver }
"#;

    let result = ws.run(yaml).await;

    assert!(!result.success);
    assert!(result.stage_results.is_empty());
    assert_eq!(result.total_stages, 1);
    assert!(result.error.unwrap().contains("Leave control workbook not found"));
    assert!(!ws.output_root("out").join("silver").exists());
}

#[tokio::test]
async fn declarative_inputs_reach_the_unit() {
    let ws = Workspace::new();
    let control = ws.dir.path().join("control.xlsx");
    std::fs::write(&control, b"xlsx").unwrap();

    let yaml = r#"
id: practicantes
display_name: Practicantes
preconditions:
  - { from_run: control, kind: file }
stages:
  - name: silver
    unit: silver
    inputs:
      archivo: { from_run: control }
    outputs:
      - { path_template: "${output_dir}/silver/data.parquet", key: parquet }
  - name: gold
    unit: echo
    with:
      sheet: Practicantes
    inputs:
      ruta_silver: { from_stage: silver, output_key: parquet }
      registros: { from_stage: silver, output_key: registros }
      carpeta: { path: "${output_dir}/gold" }
"#;

    let inputs = RunInputs::new().with_path("control", &control);
    let result = ws.run_with(yaml, inputs, ExecutionOptions::default()).await;
    assert!(result.success, "{:?}", result.error);

    let out = ws.output_root("out");
    let echoed = result.stage("gold").unwrap().raw_return_value.clone().unwrap();
    assert_eq!(echoed["ruta_silver"], json!(out.join("silver/data.parquet").to_string_lossy()));
    assert_eq!(echoed["registros"], json!(3));
    assert_eq!(echoed["carpeta"], json!(out.join("gold").to_string_lossy()));
    assert_eq!(echoed["sheet"], json!("Practicantes"));
    assert_eq!(echoed["output_dir"], json!(out.to_string_lossy()));
}

#[tokio::test]
async fn positional_fallback_hands_outputs_forward() {
    let ws = Workspace::new();
    let yaml = r#"
id: nomina
display_name: Nomina
stages:
  - name: silver
    unit: silver
    outputs:
      - { path_template: "${output_dir}/silver/data.parquet", key: parquet_path }
  - name: gold
    unit: echo
"#;

    let inputs = RunInputs::new().with_value("period", "2025-01");
    let result = ws.run_with(yaml, inputs, ExecutionOptions::default()).await;
    assert!(result.success);

    let echoed = result.stage("gold").unwrap().raw_return_value.clone().unwrap();
    let expected = ws.output_root("out").join("silver/data.parquet");
    assert_eq!(echoed["parquet_path"], json!(expected.to_string_lossy()));
    assert!(echoed.get("period").is_none());
}

#[tokio::test]
async fn events_follow_stage_order() {
    let ws = Workspace::new();
    let (tx, mut rx) = events::channel();

    let result = PipelineExecutor::new(ws.definition(&linear(true, &["noop", "noop"])), RunInputs::new(), ws.output_root("out"))
        .with_registry(registry())
        .with_events(tx)
        .execute()
        .await;
    assert!(result.success);

    let trail: Vec<String> = rx
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::StageStarted { name, .. } => Some(format!("start {}", name)),
            PipelineEvent::StageCompleted { name, success, .. } => Some(format!("done {} {}", name, success)),
            PipelineEvent::Progress { percent, .. } => Some(format!("{}%", percent)),
            PipelineEvent::Log { .. } => None,
        })
        .collect();

    assert_eq!(
        trail,
        vec![
            "start stage1",
            "0%",
            "done stage1 true",
            "50%",
            "start stage2",
            "50%",
            "done stage2 true",
            "100%",
            "100%",
        ]
    );
}

#[tokio::test]
async fn failure_events_carry_trace_at_debug() {
    let ws = Workspace::new();
    let (tx, mut rx) = events::channel();

    PipelineExecutor::new(ws.definition(&linear(true, &["invalid_input"])), RunInputs::new(), ws.output_root("out"))
        .with_registry(registry())
        .with_events(tx)
        .execute()
        .await;

    let logs: Vec<(tierflow::pipeline::LogLevel, String)> = rx
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::Log { level, message } => Some((level, message)),
            _ => None,
        })
        .collect();

    use tierflow::pipeline::LogLevel;
    assert!(logs
        .iter()
        .any(|(level, msg)| *level == LogLevel::Error && msg.contains("stage1") && msg.contains("missing column")));
    assert!(logs
        .iter()
        .any(|(level, msg)| *level == LogLevel::Debug && msg.starts_with("InvalidInputError")));
    assert!(logs.iter().any(|(_, msg)| msg == "STAGE 1/1: stage1"));
}

struct Sleepy;

#[async_trait::async_trait]
impl StageUnit for Sleepy {
    async fn run(&self, _params: &StageParams) -> StageOutcome {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn cancellation_stops_the_run_regardless_of_policy() {
    let ws = Workspace::new();
    let mut registry = registry();
    registry.register("sleepy", Sleepy);

    let cancel = CancelHandle::new();
    let executor = PipelineExecutor::new(
        ws.definition(&linear(false, &["sleepy", "noop"])),
        RunInputs::new(),
        ws.output_root("out"),
    )
    .with_registry(registry)
    .with_cancel(cancel.clone());

    let run = tokio::spawn(async move { executor.execute().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = run.await.unwrap();
    assert!(!result.success);
    assert_eq!(result.stage_results.len(), 1);
    assert_eq!(result.error.as_deref(), Some("Run cancelled"));
    assert_eq!(
        result.failed_stages[0].exception_type.as_deref(),
        Some(kinds::CANCELLED)
    );
}

#[tokio::test]
async fn definition_timeout_applies() {
    let ws = Workspace::new();
    let mut registry = registry();
    registry.register("sleepy", Sleepy);

    let yaml = "id: t\ndisplay_name: T\nconfig:\n  stage_timeout_secs: 1\nstages:\n  - { name: slow, unit: sleepy }\n";
    let result = PipelineExecutor::new(ws.definition(yaml), RunInputs::new(), ws.output_root("out"))
        .with_registry(registry)
        .execute()
        .await;

    assert_eq!(
        result.failed_stages[0].exception_type.as_deref(),
        Some(kinds::TIMEOUT)
    );
}

#[cfg(unix)]
#[tokio::test]
async fn shell_stages_hand_files_forward() {
    let ws = Workspace::new();
    let input = ws.dir.path().join("bronze.csv");
    std::fs::write(&input, "b\na\nb\n").unwrap();

    let yaml = r#"
id: ventas
display_name: Ventas
stages:
  - name: silver
    unit: shell
    with:
      command: "mkdir -p silver && sort -u \"$TIERFLOW_SOURCE\" > silver/ventas.csv"
    inputs:
      source: { from_run: source }
    outputs:
      - { path_template: "${output_dir}/silver/ventas.csv", key: ventas }
  - name: gold
    unit: shell
    with:
      command: "echo '{\"success\": false, \"error\": \"no gold rules yet\"}'"
    inputs:
      ventas: { from_stage: silver, output_key: ventas }
"#;

    let inputs = RunInputs::new().with_path("source", &input);
    let result = ws.run_with(yaml, inputs, ExecutionOptions::default()).await;

    let sorted = std::fs::read_to_string(ws.output_root("out").join("silver/ventas.csv")).unwrap();
    assert_eq!(sorted, "a\nb\n");

    assert_eq!(result.completed_stages, 1);
    let gold = result.stage("gold").unwrap();
    assert_eq!(gold.status, StageStatus::SoftFailure);
    assert_eq!(gold.error_detail.as_ref().unwrap().message, "no gold rules yet");
}

