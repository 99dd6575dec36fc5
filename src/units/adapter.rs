// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Boundary adapters
//!
//! Wrap plain functions as stage units, converting whichever failure
//! convention they use into a [`StageOutcome`].

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use super::{StageError, StageOutcome, StageParams, StageUnit};

type BlockingFn = dyn Fn(&StageParams) -> StageOutcome + Send + Sync;

tokio::task_local! {
    static BLOCKING_WORK: BlockingWork;
}

/// Count of blocking closures still running for one stage
///
/// Aborting a unit's task drops its future but not a closure already on the
/// blocking pool; the stage executor waits on this before moving on.
#[derive(Debug, Clone)]
pub(crate) struct BlockingWork {
    running: Arc<watch::Sender<usize>>,
}

impl BlockingWork {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { running: Arc::new(tx) }
    }

    fn enter(&self) -> BlockingGuard {
        self.running.send_modify(|n| *n += 1);
        BlockingGuard {
            running: Arc::clone(&self.running),
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        *self.running.borrow() > 0
    }

    /// Resolve once no tracked closure is running
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

struct BlockingGuard {
    running: Arc<watch::Sender<usize>>,
}

impl Drop for BlockingGuard {
    fn drop(&mut self) {
        self.running.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Run `future` with `work` tracking the blocking closures it starts
pub(crate) fn track_blocking<F: Future>(work: BlockingWork, future: F) -> impl Future<Output = F::Output> {
    BLOCKING_WORK.scope(work, future)
}

/// A synchronous function registered as a stage unit.
///
/// The function runs on tokio's blocking pool, so long file transformations
/// do not stall the runtime. A panic inside it becomes a raised `Panic` error.
/// It cannot be interrupted: on timeout or cancellation the stage executor
/// waits for it to return before the run continues.
#[derive(Clone)]
pub struct FnUnit {
    description: String,
    func: Arc<BlockingFn>,
}

impl FnUnit {
    /// Wrap a function that already returns a [`StageOutcome`]
    pub fn new<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&StageParams) -> StageOutcome + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            func: Arc::new(func),
        }
    }
}

impl std::fmt::Debug for FnUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUnit")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StageUnit for FnUnit {
    async fn run(&self, params: &StageParams) -> StageOutcome {
        let func = Arc::clone(&self.func);
        let params = params.clone();
        let guard = BLOCKING_WORK.try_with(BlockingWork::enter).ok();

        let blocking = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            func(&params)
        });

        match blocking.await {
            Ok(outcome) => outcome,
            Err(e) => Err(StageError::from_join_error(e)),
        }
    }

    fn describe(&self) -> &str {
        &self.description
    }
}

/// Wrap a function that reports failure through a `{success, error}` object
pub fn report_fn<F>(description: impl Into<String>, func: F) -> FnUnit
where
    F: Fn(&StageParams) -> Value + Send + Sync + 'static,
{
    FnUnit::new(description, move |params| normalize_report(func(params)))
}

/// Wrap a function returning a typed error
pub fn fallible_fn<F, E>(description: impl Into<String>, func: F) -> FnUnit
where
    F: Fn(&StageParams) -> Result<Value, E> + Send + Sync + 'static,
    E: std::error::Error + 'static,
{
    FnUnit::new(description, move |params| {
        func(params).map_err(|e| StageError::from_error(&e))
    })
}

/// Wrap a function returning `anyhow::Result`
pub fn anyhow_fn<F>(description: impl Into<String>, func: F) -> FnUnit
where
    F: Fn(&StageParams) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    FnUnit::new(description, move |params| {
        func(params).map_err(|e| StageError::from_anyhow(&e))
    })
}

/// Classify a structured return value.
///
/// - an object with `success: false` is a reported failure
/// - an object without `success` but with a non-null `error` is a reported failure
/// - anything else is a success carrying the value unchanged
pub fn normalize_report(value: Value) -> StageOutcome {
    let Value::Object(map) = &value else {
        return Ok(value);
    };

    let failed = match map.get("success") {
        Some(Value::Bool(flag)) => !flag,
        _ => map.get("error").is_some_and(|e| !e.is_null()),
    };

    if !failed {
        return Ok(value);
    }

    let message = ["error", "message"]
        .iter()
        .filter_map(|field| map.get(*field))
        .find_map(|v| match v {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| "stage reported failure without a message".to_string());

    Err(StageError::reported(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::kinds;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct InvalidInputError(String);

    #[test]
    fn test_success_false_is_reported() {
        let err = normalize_report(json!({"success": false, "error": "missing column"})).unwrap_err();
        assert_eq!(err, StageError::reported("missing column"));
    }

    #[test]
    fn test_message_field_used_when_no_error() {
        let err = normalize_report(json!({"success": false, "message": "empty sheet"})).unwrap_err();
        assert_eq!(err.message(), "empty sheet");
    }

    #[test]
    fn test_error_without_success_is_reported() {
        let err = normalize_report(json!({"error": "bad header"})).unwrap_err();
        assert_eq!(err.message(), "bad header");
    }

    #[test]
    fn test_success_true_with_error_field_passes() {
        let value = json!({"success": true, "error": null, "registros": 10});
        assert_eq!(normalize_report(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(normalize_report(json!(42)).unwrap(), json!(42));
        assert_eq!(normalize_report(Value::Null).unwrap(), Value::Null);
        assert_eq!(normalize_report(json!({"rows": 3})).unwrap(), json!({"rows": 3}));
    }

    #[test]
    fn test_failure_without_message() {
        let err = normalize_report(json!({"success": false})).unwrap_err();
        assert!(err.message().contains("without a message"));
    }

    #[tokio::test]
    async fn test_fallible_fn_records_error_type() {
        let unit = fallible_fn("validate", |_: &StageParams| {
            Err::<Value, _>(InvalidInputError("missing column".into()))
        });

        let err = unit.run(&StageParams::new()).await.unwrap_err();
        assert_eq!(err.error_type(), Some("InvalidInputError"));
        assert_eq!(err.message(), "missing column");
    }

    #[tokio::test]
    async fn test_raised_and_reported_messages_match() {
        let raised = fallible_fn("raise", |_: &StageParams| {
            Err::<Value, _>(InvalidInputError("x".into()))
        });
        let reported = report_fn("report", |_: &StageParams| json!({"success": false, "error": "x"}));

        let a = raised.run(&StageParams::new()).await.unwrap_err();
        let b = reported.run(&StageParams::new()).await.unwrap_err();

        assert_eq!(a.message(), b.message());
        assert!(a.error_type().is_some());
        assert!(b.error_type().is_none());
    }

    #[tokio::test]
    async fn test_panic_becomes_raised_error() {
        let unit = FnUnit::new("explode", |_: &StageParams| -> StageOutcome {
            panic!("division by zero in row 7")
        });

        let err = unit.run(&StageParams::new()).await.unwrap_err();
        assert_eq!(err.error_type(), Some(kinds::PANIC));
        assert_eq!(err.message(), "division by zero in row 7");
    }

    #[tokio::test]
    async fn test_blocking_work_outlives_dropped_future() {
        let work = BlockingWork::new();
        let unit = FnUnit::new("slow", |_: &StageParams| {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(Value::Null)
        });

        let params = StageParams::new();
        let run = track_blocking(work.clone(), async { unit.run(&params).await });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), run).await;

        assert!(timed_out.is_err());
        assert!(work.is_busy());
        work.wait_idle().await;
        assert!(!work.is_busy());
    }

    #[tokio::test]
    async fn test_fn_unit_receives_params() {
        let unit = FnUnit::new("echo", |params: &StageParams| {
            Ok(json!({ "got": params.str("name") }))
        });

        let value = unit
            .run(&StageParams::new().with("name", "silver"))
            .await
            .unwrap();
        assert_eq!(value, json!({"got": "silver"}));
        assert_eq!(unit.describe(), "echo");
    }
}
