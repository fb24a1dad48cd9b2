//! Bounded-concurrency batch execution over an [`Agent`] (§4.7).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use citadel_errors::CitadelResult;
use tokio::sync::{mpsc, Semaphore};

use crate::agent::{Agent, AgentInput, AgentOutput};

/// How the executor reacts to a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop scheduling new tasks on the first failure; tasks already
    /// in flight are allowed to finish.
    FailFast,
    /// Attempt every task regardless of earlier failures.
    Continue,
}

/// Configuration for a [`BatchExecutor`].
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutorConfig {
    /// Maximum number of tasks in flight at any moment.
    pub max_concurrency: usize,
    /// Deadline for the whole batch, attached to every task.
    pub timeout: Duration,
    /// Behaviour on task failure.
    pub error_policy: ErrorPolicy,
}

impl Default for BatchExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            timeout: Duration::from_secs(30),
            error_policy: ErrorPolicy::Continue,
        }
    }
}

/// The outcome of one batch run: `results[i]`/`errors` correspond to
/// `inputs[i]` for every index that completed before termination.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// `Some` for every input that completed successfully before
    /// termination; `None` for slots left incomplete under `FailFast`.
    pub results: Vec<Option<AgentOutput>>,
    /// Failures keyed by input index.
    pub errors: Vec<(usize, citadel_errors::CitadelError)>,
}

#[derive(Default)]
struct BatchStatsInner {
    total_executions: AtomicU64,
    total_tasks: AtomicU64,
    success_tasks: AtomicU64,
    failure_tasks: AtomicU64,
    duration_total_micros: AtomicU64,
}

/// Point-in-time counters accumulated across every [`BatchExecutor`]
/// invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    /// Number of `execute`/`execute_stream` calls.
    pub total_executions: u64,
    /// Total tasks attempted across every call.
    pub total_tasks: u64,
    /// Tasks that completed successfully.
    pub success_tasks: u64,
    /// Tasks that failed.
    pub failure_tasks: u64,
    /// `total_tasks / total_executions`; `0.0` with no traffic.
    pub average_tasks_per_execution: f64,
    /// `success_tasks / total_tasks` as a percentage; `0.0` with no
    /// traffic.
    pub success_rate_percent: f64,
    /// Mean wall-clock duration of an `execute` call, in microseconds.
    pub average_duration_micros: f64,
}

/// Runs a batch of inputs against a wrapped [`Agent`] with bounded
/// concurrency, a shared deadline, and a configurable error policy.
pub struct BatchExecutor<A: Agent> {
    inner: Arc<A>,
    config: BatchExecutorConfig,
    stats: BatchStatsInner,
}

impl<A: Agent + 'static> BatchExecutor<A> {
    /// Wrap `inner` with `config`.
    pub fn new(inner: Arc<A>, config: BatchExecutorConfig) -> Self {
        Self {
            inner,
            config,
            stats: BatchStatsInner::default(),
        }
    }

    /// Run every input in `inputs`, returning once the batch has
    /// terminated (either all tasks completed, or `FailFast` stopped
    /// scheduling after the first failure and in-flight tasks drained).
    #[tracing::instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn execute(&self, inputs: Vec<AgentInput>) -> BatchOutcome {
        let started = Instant::now();
        let total = inputs.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let stop = Arc::new(AtomicBool::new(false));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, input) in inputs.into_iter().enumerate() {
            if self.config.error_policy == ErrorPolicy::FailFast && stop.load(Ordering::Relaxed) {
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let inner = self.inner.clone();
            let timeout = self.config.timeout;
            let stop = stop.clone();
            let policy = self.config.error_policy;
            join_set.spawn(async move {
                let _permit = permit;
                let outcome = tokio::time::timeout(timeout, inner.invoke(input)).await;
                let result = match outcome {
                    Ok(inner_result) => inner_result,
                    Err(_) => Err(citadel_errors::CitadelError::new(citadel_errors::ErrorKind::Timeout)),
                };
                if result.is_err() && policy == ErrorPolicy::FailFast {
                    stop.store(true, Ordering::Relaxed);
                }
                (index, result)
            });
        }

        let mut results: Vec<Option<AgentOutput>> = (0..total).map(|_| None).collect();
        let mut errors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.expect("batch task panicked");
            match result {
                Ok(output) => {
                    results[index] = Some(output);
                    self.stats.success_tasks.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    errors.push((index, err));
                    self.stats.failure_tasks.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        errors.sort_by_key(|(index, _)| *index);

        self.stats.total_executions.fetch_add(1, Ordering::Relaxed);
        self.stats.total_tasks.fetch_add(total as u64, Ordering::Relaxed);
        self.stats
            .duration_total_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

        BatchOutcome { results, errors }
    }

    /// Stream variant: spawns the same bounded-concurrency execution but
    /// returns two channels instead of waiting for the whole batch.
    /// Readers MUST drain both channels; they close once every task has
    /// terminated.
    pub fn execute_stream(
        self: &Arc<Self>,
        inputs: Vec<AgentInput>,
    ) -> (
        mpsc::UnboundedReceiver<(usize, AgentOutput)>,
        mpsc::UnboundedReceiver<(usize, citadel_errors::CitadelError)>,
    ) {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = executor.execute(inputs).await;
            for (index, output) in outcome.results.into_iter().enumerate() {
                if let Some(output) = output {
                    let _ = result_tx.send((index, output));
                }
            }
            for (index, err) in outcome.errors {
                let _ = error_tx.send((index, err));
            }
        });
        (result_rx, error_rx)
    }

    /// Snapshot the executor's accumulated counters.
    pub fn stats(&self) -> BatchStats {
        let total_executions = self.stats.total_executions.load(Ordering::Relaxed);
        let total_tasks = self.stats.total_tasks.load(Ordering::Relaxed);
        let success_tasks = self.stats.success_tasks.load(Ordering::Relaxed);
        let failure_tasks = self.stats.failure_tasks.load(Ordering::Relaxed);
        let average_tasks_per_execution = if total_executions == 0 {
            0.0
        } else {
            total_tasks as f64 / total_executions as f64
        };
        let success_rate_percent = if total_tasks == 0 {
            0.0
        } else {
            (success_tasks as f64 / total_tasks as f64) * 100.0
        };
        let average_duration_micros = if total_executions == 0 {
            0.0
        } else {
            self.stats.duration_total_micros.load(Ordering::Relaxed) as f64 / total_executions as f64
        };
        BatchStats {
            total_executions,
            total_tasks,
            success_tasks,
            failure_tasks,
            average_tasks_per_execution,
            success_rate_percent,
            average_duration_micros,
        }
    }
}
