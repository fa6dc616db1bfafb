//! Parallel execution of independent backtest trials.
//!
//! Trials share nothing mutable: each builds its own strategy and portfolio.
//! A failing or panicking trial is recorded and the rest keep running.

use market_core::{Error, Result};
use rayon::prelude::*;
use risk_analytics::{percentile, sample_std};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Min};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::result::BacktestResult;

/// Cooperative cancellation flag checked between trials.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Batch settings.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Worker threads. `None` uses the global rayon pool.
    pub max_threads: Option<usize>,
    /// Trials not started before this much time has passed are skipped.
    pub timeout: Option<Duration>,
}

/// Progress snapshot passed to the batch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// Callback receiving [`BatchProgress`] after every finished trial.
pub type BatchProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Why a trial never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCause {
    Cancelled,
    TimedOut,
}

/// A trial that ran and failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialFailure {
    pub trial: usize,
    pub error: String,
}

enum TrialOutcome {
    Succeeded(BacktestResult),
    Failed(String),
    Skipped(SkipCause),
}

/// Summary statistics of one metric across successful trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
}

impl DistributionStats {
    /// `None` for an empty sample.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let data = Data::new(values.to_vec());
        Some(Self {
            count: values.len(),
            mean: data.mean().unwrap_or(0.0),
            std_dev: sample_std(values),
            min: data.min(),
            max: data.max(),
            p5: percentile(values, 5.0),
            p25: percentile(values, 25.0),
            median: percentile(values, 50.0),
            p75: percentile(values, 75.0),
            p95: percentile(values, 95.0),
        })
    }
}

/// Collected outcomes of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total_trials: usize,
    /// Successful results, keyed by trial index, ascending.
    pub results: Vec<(usize, BacktestResult)>,
    pub failures: Vec<TrialFailure>,
    pub cancelled: usize,
    pub timed_out: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn skipped(&self) -> usize {
        self.cancelled + self.timed_out
    }

    /// True when every trial ran and succeeded.
    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.total_trials
    }

    /// Human-readable success count, e.g. `"97 of 100 trials succeeded"`.
    pub fn status_line(&self) -> String {
        format!("{} of {} trials succeeded", self.succeeded(), self.total_trials)
    }

    /// Distribution of one summary metric over the successful trials.
    pub fn metric_stats<F>(&self, metric: F) -> Option<DistributionStats>
    where
        F: Fn(&BacktestResult) -> f64,
    {
        let values: Vec<f64> = self
            .results
            .iter()
            .map(|(_, result)| metric(result))
            .filter(|v| v.is_finite())
            .collect();
        DistributionStats::from_values(&values)
    }

    /// Distribution of total return (percent).
    pub fn total_return_stats(&self) -> Option<DistributionStats> {
        self.metric_stats(|r| r.get_performance_summary().total_return)
    }
}

/// Runs trials in parallel on a rayon pool.
#[derive(Clone, Default)]
pub struct BatchRunner {
    config: BatchConfig,
    cancel: CancellationToken,
    progress: Option<BatchProgressCallback>,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Share an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: BatchProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `trials` invocations of `trial`, passing each its index.
    ///
    /// Only building the thread pool can fail; trial failures land in the
    /// report.
    pub fn run<F>(&self, trials: usize, trial: F) -> Result<BatchReport>
    where
        F: Fn(usize) -> Result<BacktestResult> + Sync + Send,
    {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let completed = AtomicUsize::new(0);

        info!(trials, threads = ?self.config.max_threads, "Starting batch");

        let work = || -> Vec<(usize, TrialOutcome)> {
            (0..trials)
                .into_par_iter()
                .map(|index| (index, self.run_trial(index, &trial, deadline, &completed, trials)))
                .collect()
        };

        let outcomes = match self.config.max_threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::config(format!("failed to build thread pool: {}", e)))?
                .install(work),
            None => work(),
        };

        let mut report = BatchReport {
            total_trials: trials,
            results: Vec::new(),
            failures: Vec::new(),
            cancelled: 0,
            timed_out: 0,
            elapsed: started.elapsed(),
        };
        for (index, outcome) in outcomes {
            match outcome {
                TrialOutcome::Succeeded(result) => report.results.push((index, result)),
                TrialOutcome::Failed(error) => report.failures.push(TrialFailure { trial: index, error }),
                TrialOutcome::Skipped(SkipCause::Cancelled) => report.cancelled += 1,
                TrialOutcome::Skipped(SkipCause::TimedOut) => report.timed_out += 1,
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            skipped = report.skipped(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "{}",
            report.status_line()
        );
        Ok(report)
    }

    fn run_trial<F>(
        &self,
        index: usize,
        trial: &F,
        deadline: Option<Instant>,
        completed: &AtomicUsize,
        total: usize,
    ) -> TrialOutcome
    where
        F: Fn(usize) -> Result<BacktestResult> + Sync,
    {
        if self.cancel.is_cancelled() {
            return TrialOutcome::Skipped(SkipCause::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return TrialOutcome::Skipped(SkipCause::TimedOut);
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| trial(index))) {
            Ok(Ok(result)) => TrialOutcome::Succeeded(result),
            Ok(Err(e)) => {
                warn!(trial = index, error = %e, "Trial failed");
                TrialOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(trial = index, panic = %message, "Trial panicked");
                TrialOutcome::Failed(format!("trial panicked: {}", message))
            }
        };

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = &self.progress {
            callback(BatchProgress { completed: done, total });
        }
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
