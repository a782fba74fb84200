use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, TaskState};

/// How a completed (non-skipped) run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure(ErrorKind),
}

/// Counters and timings for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub total_runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub skips: u64,
    pub misfires: u64,
    pub total_duration: Duration,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub last_state: Option<TaskState>,
    pub last_error: Option<ErrorKind>,
}

impl JobMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_runs as f64
        }
    }

    pub fn avg_duration(&self) -> Duration {
        match u32::try_from(self.total_runs) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.total_runs as f64),
        }
    }

    fn record(&mut self, outcome: RunOutcome, duration: Duration, at: DateTime<Utc>) {
        self.total_runs += 1;
        self.total_duration += duration;
        self.last_run_time = Some(at);
        self.last_duration = Some(duration);
        match outcome {
            RunOutcome::Success => {
                self.successes += 1;
                self.last_state = Some(TaskState::Success);
                self.last_error = None;
            }
            RunOutcome::Failure(kind) => {
                self.failures += 1;
                self.last_state = Some(TaskState::Failed);
                self.last_error = Some(kind);
            }
        }
    }
}

/// Process-wide aggregate mirrored from every per-task update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub skips: u64,
    pub misfires: u64,
    pub total_duration: Duration,
    pub start_time: Option<DateTime<Utc>>,
}

impl GlobalMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_runs as f64
        }
    }
}

/// Global section of a [`MetricsSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    #[serde(flatten)]
    pub metrics: GlobalMetrics,
    pub uptime: Option<Duration>,
    pub is_running: bool,
    pub total_tasks: usize,
    /// Tasks whose latest state is `Success`.
    pub completed_tasks: usize,
}

/// Copy of all metrics handed to external readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub global: GlobalSnapshot,
    pub tasks: BTreeMap<String, JobMetrics>,
}

#[derive(Debug, Default)]
pub struct MetricsAggregator {
    per_task: HashMap<String, JobMetrics>,
    global: GlobalMetrics,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, task_id: &str) {
        self.per_task.entry(task_id.to_string()).or_default();
    }

    pub fn forget(&mut self, task_id: &str) {
        self.per_task.remove(task_id);
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.global.start_time = Some(at);
    }

    pub fn record(&mut self, task_id: &str, outcome: RunOutcome, duration: Duration) {
        let now = Utc::now();
        self.per_task
            .entry(task_id.to_string())
            .or_default()
            .record(outcome, duration, now);

        self.global.total_runs += 1;
        self.global.total_duration += duration;
        match outcome {
            RunOutcome::Success => self.global.successes += 1,
            RunOutcome::Failure(_) => self.global.failures += 1,
        }
    }

    /// Counts a failed attempt that will be retried. Does not count as a run.
    pub fn record_retry(&mut self, task_id: &str, kind: ErrorKind, attempt_duration: Duration) {
        let m = self.per_task.entry(task_id.to_string()).or_default();
        m.retries += 1;
        m.last_run_time = Some(Utc::now());
        m.last_duration = Some(attempt_duration);
        m.last_state = Some(TaskState::Retrying);
        m.last_error = Some(kind);

        self.global.retries += 1;
    }

    pub fn record_skip(&mut self, task_id: &str) {
        let m = self.per_task.entry(task_id.to_string()).or_default();
        m.skips += 1;
        m.last_state = Some(TaskState::Skipped);

        self.global.skips += 1;
    }

    pub fn record_misfire(&mut self, task_id: &str) {
        self.per_task.entry(task_id.to_string()).or_default().misfires += 1;
        self.global.misfires += 1;
    }

    pub fn get(&self, task_id: &str) -> Option<JobMetrics> {
        self.per_task.get(task_id).cloned()
    }

    pub fn global(&self) -> &GlobalMetrics {
        &self.global
    }

    pub fn snapshot(&self, is_running: bool, completed_tasks: usize) -> MetricsSnapshot {
        let uptime = self
            .global
            .start_time
            .and_then(|start| (Utc::now() - start).to_std().ok());

        MetricsSnapshot {
            global: GlobalSnapshot {
                metrics: self.global.clone(),
                uptime,
                is_running,
                total_tasks: self.per_task.len(),
                completed_tasks,
            },
            tasks: self
                .per_task
                .iter()
                .map(|(id, m)| (id.clone(), m.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_metrics_have_zero_rate() {
        let m = JobMetrics::default();
        assert_eq!(m.success_rate(), 0.0);
        assert_eq!(m.avg_duration(), Duration::ZERO);
    }

    #[test]
    fn retries_and_skips_do_not_count_as_runs() {
        let mut agg = MetricsAggregator::new();
        agg.track("a");
        agg.record_retry("a", ErrorKind::Timeout, Duration::from_secs(1));
        agg.record_skip("a");
        agg.record_skip("a");

        let m = agg.get("a").unwrap();
        assert_eq!(m.total_runs, 0);
        assert_eq!(m.successes + m.failures, 0);
        assert_eq!(m.retries, 1);
        assert_eq!(m.skips, 2);
        assert_eq!(agg.global().retries, 1);
        assert_eq!(agg.global().skips, 2);
    }

    #[test]
    fn failure_keeps_error_kind() {
        let mut agg = MetricsAggregator::new();
        agg.record("a", RunOutcome::Failure(ErrorKind::Timeout), Duration::from_millis(10));
        let m = agg.get("a").unwrap();
        assert_eq!(m.last_state, Some(TaskState::Failed));
        assert_eq!(m.last_error, Some(ErrorKind::Timeout));
    }

    proptest! {
        #[test]
        fn rates_match_recorded_runs(runs in proptest::collection::vec((any::<bool>(), 0u64..5_000), 1..50)) {
            let mut agg = MetricsAggregator::new();
            let mut total = Duration::ZERO;
            let mut successes = 0u64;
            for (ok, millis) in &runs {
                let d = Duration::from_millis(*millis);
                total += d;
                let outcome = if *ok {
                    successes += 1;
                    RunOutcome::Success
                } else {
                    RunOutcome::Failure(ErrorKind::Execution)
                };
                agg.record("t", outcome, d);
            }

            let m = agg.get("t").unwrap();
            let n = runs.len() as u64;
            prop_assert_eq!(m.total_runs, n);
            prop_assert_eq!(m.successes, successes);
            prop_assert!((m.success_rate() - successes as f64 / n as f64).abs() < 1e-12);
            prop_assert_eq!(m.avg_duration(), total / n as u32);
            prop_assert_eq!(agg.global().total_runs, n);
            prop_assert_eq!(agg.global().total_duration, total);
        }
    }
}
