//! Fail-fast stage runner.
//!
//! Stages run strictly in order. The first failing stage halts the run, so
//! `stages_ran` always ends with the failing stage and nothing after it.
//! A stage that returns `Err` or panics is recorded as a failing result for
//! that stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::{self, kinds, AuditEntry, SharedAuditSink};
use crate::error::{Severity, StageFault};
use crate::pipeline::stage::{Stage, StageResult};

/// Notified once per stage, in order, after a fully successful run.
pub trait StageObserver: Send + Sync {
    fn stage_complete(&self, pipeline: &str, result: &StageResult);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecutionResult {
    /// Correlates the result with its audit entry
    pub run_id: String,
    pub pipeline: String,
    pub entity_id: String,
    pub results: Vec<StageResult>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    pub stages_ran: Vec<String>,
    /// Stages the pipeline was built with, run or not
    pub stages_registered: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineExecutionResult {
    pub fn failure(&self) -> Option<&StageResult> {
        self.results.iter().find(|r| !r.success)
    }

    /// Highest severity among failing stages.
    pub fn severity(&self) -> Severity {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Low)
    }

    pub fn stages_completed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.stage_name.as_str())
            .collect()
    }

    pub fn stages_failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.stage_name.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        match &self.failed_stage {
            None => format!("{}: {} stages passed", self.pipeline, self.stages_ran.len()),
            Some(stage) => format!(
                "{}: failed at {} ({}/{} stages ran)",
                self.pipeline,
                stage,
                self.stages_ran.len(),
                self.stages_registered
            ),
        }
    }
}

pub struct PipelineRunner<S> {
    name: String,
    stages: Vec<Box<dyn Stage<S> + Send + Sync>>,
    observers: Vec<Arc<dyn StageObserver>>,
    audit: SharedAuditSink,
}

impl<S> PipelineRunner<S> {
    pub fn new(name: impl Into<String>, audit: SharedAuditSink) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            observers: Vec::new(),
            audit,
        }
    }

    pub fn with_stage(mut self, stage: impl Stage<S> + Send + Sync + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StageObserver>) {
        self.observers.push(observer);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage against `state`, halting at the first failure.
    pub fn run(&self, entity_id: &str, state: &mut S) -> PipelineExecutionResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.stages.len());
        let mut failed_stage = None;

        for stage in &self.stages {
            let stage_name = stage.name().to_string();
            let stage_start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.run(state)));

            let mut result = match outcome {
                Ok(Ok(mut result)) => {
                    // The runner owns attribution.
                    result.stage_name = stage_name.clone();
                    result
                }
                Ok(Err(fault)) => StageResult::from_fault(&stage_name, &fault),
                Err(payload) => {
                    let fault = StageFault::new(&stage_name, panic_message(payload.as_ref()));
                    StageResult::from_fault(&stage_name, &fault)
                }
            };
            result.duration_ms = stage_start.elapsed().as_millis() as u64;

            let success = result.success;
            if success {
                debug!(pipeline = %self.name, stage = %stage_name, "Stage passed");
            } else {
                warn!(
                    pipeline = %self.name,
                    stage = %stage_name,
                    severity = %result.severity,
                    diagnostics = result.diagnostics.len(),
                    "Stage failed"
                );
            }
            results.push(result);

            if !success {
                failed_stage = Some(stage_name);
                break;
            }
        }

        let passed = failed_stage.is_none();
        let execution = PipelineExecutionResult {
            run_id: uuid::Uuid::new_v4().to_string(),
            pipeline: self.name.clone(),
            entity_id: entity_id.to_string(),
            stages_ran: results.iter().map(|r| r.stage_name.clone()).collect(),
            stages_registered: self.stages.len(),
            results,
            passed,
            failed_stage,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if passed {
            self.notify_observers(&execution);
        }

        info!(
            pipeline = %self.name,
            entity_id,
            passed,
            stages_ran = execution.stages_ran.len(),
            "Pipeline finished"
        );

        audit::record(
            self.audit.as_ref(),
            AuditEntry::new(
                entity_id,
                kinds::PIPELINE_OUTCOME,
                serde_json::json!({
                    "runId": execution.run_id,
                    "pipeline": self.name,
                    "stagesCompleted": execution.stages_completed(),
                    "stagesFailed": execution.stages_failed(),
                    "passed": passed,
                }),
            ),
        );

        execution
    }

    fn notify_observers(&self, execution: &PipelineExecutionResult) {
        for result in &execution.results {
            for observer in &self.observers {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                    observer.stage_complete(&self.name, result)
                }));
                if delivered.is_err() {
                    warn!(pipeline = %self.name, stage = %result.stage_name, "Stage observer panicked");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::pipeline::stage::FnStage;
    use std::sync::Mutex;

    fn push_stage(name: &'static str) -> FnStage<impl Fn(&mut Vec<String>) -> Result<StageResult, StageFault>> {
        FnStage::new(name, move |log: &mut Vec<String>| {
            log.push(name.to_string());
            Ok(StageResult::passed(name))
        })
    }

    fn failing_stage(name: &'static str) -> FnStage<impl Fn(&mut Vec<String>) -> Result<StageResult, StageFault>> {
        FnStage::new(name, move |log: &mut Vec<String>| {
            log.push(name.to_string());
            Ok(StageResult::failed(name, Severity::High, vec!["nope".to_string()]))
        })
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl StageObserver for Recorder {
        fn stage_complete(&self, _pipeline: &str, result: &StageResult) {
            self.seen.lock().unwrap().push(result.stage_name.clone());
        }
    }

    struct Panicker;

    impl StageObserver for Panicker {
        fn stage_complete(&self, _: &str, _: &StageResult) {
            panic!("observer blew up");
        }
    }

    #[test]
    fn test_fail_fast_for_every_position() {
        for k in 1..=4usize {
            let sink = Arc::new(MemoryAuditSink::new());
            let mut runner: PipelineRunner<Vec<String>> = PipelineRunner::new("p", sink.clone());
            let names = ["a", "b", "c", "d"];
            for (i, name) in names.into_iter().enumerate() {
                runner = if i + 1 == k {
                    runner.with_stage(failing_stage(name))
                } else {
                    runner.with_stage(push_stage(name))
                };
            }

            let mut log = Vec::new();
            let result = runner.run("e", &mut log);
            assert!(!result.passed);
            assert_eq!(result.stages_ran.len(), k);
            assert_eq!(result.results.len(), k);
            assert_eq!(log.len(), k);
            assert_eq!(result.failed_stage.as_deref(), Some(names[k - 1]));
            assert_eq!(result.stages_registered, 4);
            assert_eq!(result.summary(), format!("p: failed at {} ({k}/4 stages ran)", names[k - 1]));
            assert_eq!(sink.count_kind(kinds::PIPELINE_OUTCOME), 1);
        }
    }

    #[test]
    fn test_err_and_panic_become_failures() {
        let runner: PipelineRunner<Vec<String>> = PipelineRunner::new("p", Arc::new(MemoryAuditSink::new()))
            .with_stage(push_stage("a"))
            .with_stage(FnStage::new(
                "b",
                |_: &mut Vec<String>| -> Result<StageResult, StageFault> { Err(StageFault::new("b", "boom")) },
            ))
            .with_stage(push_stage("c"));
        let result = runner.run("e", &mut Vec::new());
        assert_eq!(result.failed_stage.as_deref(), Some("b"));
        assert!(result.failure().unwrap().diagnostics[0].contains("boom"));

        let runner: PipelineRunner<Vec<String>> = PipelineRunner::new("p", Arc::new(MemoryAuditSink::new()))
            .with_stage(FnStage::new("x", |_: &mut Vec<String>| -> Result<StageResult, StageFault> {
                panic!("kaboom")
            }))
            .with_stage(push_stage("y"));
        let mut log = Vec::new();
        let result = runner.run("e", &mut log);
        assert_eq!(result.stages_ran, vec!["x"]);
        assert!(result.results[0].diagnostics[0].contains("kaboom"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_observers_only_on_success_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut runner: PipelineRunner<Vec<String>> = PipelineRunner::new("p", Arc::new(MemoryAuditSink::new()))
            .with_stage(push_stage("a"))
            .with_stage(push_stage("b"));
        runner.add_observer(Arc::new(Panicker));
        runner.add_observer(recorder.clone());

        let result = runner.run("e", &mut Vec::new());
        assert!(result.passed);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["a", "b"]);

        let recorder = Arc::new(Recorder::default());
        let mut failing: PipelineRunner<Vec<String>> = PipelineRunner::new("p", Arc::new(MemoryAuditSink::new()))
            .with_stage(push_stage("a"))
            .with_stage(failing_stage("b"));
        failing.add_observer(recorder.clone());
        failing.run("e", &mut Vec::new());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_audit_payload_summarizes_run() {
        let sink = Arc::new(MemoryAuditSink::new());
        let runner: PipelineRunner<Vec<String>> = PipelineRunner::new("blueprint", sink.clone())
            .with_stage(push_stage("a"))
            .with_stage(failing_stage("b"));
        let result = runner.run("task-7", &mut Vec::new());

        let entries = sink.entries_for("task-7");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["runId"], result.run_id.as_str());
        assert_eq!(entries[0].payload["passed"], false);
        assert_eq!(entries[0].payload["stagesCompleted"][0], "a");
        assert_eq!(entries[0].payload["stagesFailed"][0], "b");
    }

    #[test]
    fn test_empty_pipeline_passes() {
        let runner: PipelineRunner<()> = PipelineRunner::new("empty", Arc::new(MemoryAuditSink::new()));
        let result = runner.run("e", &mut ());
        assert!(result.passed);
        assert!(result.stages_ran.is_empty());
    }
}
