//! Concurrent evaluation of a generation on a bounded worker pool.
//!
//! Each [`Task`] produces exactly one outcome: a [`TaskResult`] or a
//! [`TaskFailure`]. Outcomes come back in task order once the whole
//! batch has finished. A panic inside a task is caught and becomes
//! that task's failure.

use crate::evaluation::{Evaluate, Fitness};
use crate::genomics::Genome;
use crate::{ConfigurationError, GenomeId, TrialFailure};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

/// How a generation is split into tasks.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Granularity {
    /// One task evaluates all samples of a genome.
    PerGenome,
    /// One task per (genome, sample) pair.
    PerSample,
}

/// Worker pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Whether the first failed task aborts the whole batch.
    pub fatal_task_failures: bool,
}

/// A unit of work: some samples of one genome.
#[derive(Clone, Debug)]
pub struct Task<'a> {
    pub id: usize,
    pub genome: &'a Genome,
    pub samples: Range<usize>,
    pub base_seed: u64,
}

/// The outcome of a successful task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskResult {
    task_id: usize,
    genome_id: GenomeId,
    sample: usize,
    fitness: Fitness,
    successes: usize,
    failed_samples: Vec<(usize, TrialFailure)>,
    worker: usize,
}

impl TaskResult {
    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn genome_id(&self) -> GenomeId {
        self.genome_id
    }

    /// Index of the task's first sample.
    pub fn sample(&self) -> usize {
        self.sample
    }

    pub fn fitness(&self) -> &Fitness {
        &self.fitness
    }

    /// Number of samples that contributed to the fitness.
    pub fn successes(&self) -> usize {
        self.successes
    }

    /// Samples of this task that failed.
    pub fn failed_samples(&self) -> &[(usize, TrialFailure)] {
        &self.failed_samples
    }

    /// Index of the worker thread that ran the task.
    pub fn worker(&self) -> usize {
        self.worker
    }
}

/// Why a task produced no result.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureCause {
    /// Every sample of the task failed.
    Trials(Vec<(usize, TrialFailure)>),
    /// The task panicked.
    Panicked(String),
}

/// A task that produced no result.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("task {task_id} (genome {genome_id}) failed on worker {worker}: {cause}")]
pub struct TaskFailure {
    pub task_id: usize,
    pub genome_id: GenomeId,
    pub worker: usize,
    pub cause: FailureCause,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Trials(failures) => {
                write!(f, "all {} samples failed", failures.len())?;
                if let Some((sample, failure)) = failures.first() {
                    write!(f, " (sample {}: {})", sample, failure)?;
                }
                Ok(())
            }
            FailureCause::Panicked(message) => write!(f, "panicked: {}", message),
        }
    }
}

/// Run-fatal scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("aborting batch: {0}")]
    FatalTask(Box<TaskFailure>),
    #[error("no outcome for task {0}")]
    MissingResult(usize),
    #[error("more than one outcome for task {0}")]
    DuplicateResult(usize),
}

/// A bounded worker pool evaluating batches of tasks.
pub struct TaskScheduler {
    pool: ThreadPool,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Creates a pool with `config.workers` threads.
    pub fn new(config: SchedulerConfig) -> Result<TaskScheduler, SchedulerError> {
        if config.workers == 0 {
            return Err(ConfigurationError::MissingParameter("workers").into());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("evaluator-{}", i))
            .build()?;
        Ok(TaskScheduler { pool, config })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs every task of `batch` and blocks until all are done.
    ///
    /// Returns one outcome per task, in batch order. With
    /// `fatal_task_failures` set, a failed task aborts the batch.
    pub fn submit<E: Evaluate + ?Sized>(
        &self,
        batch: &[Task<'_>],
        evaluator: &E,
    ) -> Result<Vec<Result<TaskResult, TaskFailure>>, SchedulerError> {
        let mut seen = BTreeSet::new();
        for task in batch {
            if !seen.insert(task.id) {
                return Err(SchedulerError::DuplicateResult(task.id));
            }
        }

        debug!(tasks = batch.len(), workers = self.workers(), "submitting batch");
        let outcomes: Vec<Result<TaskResult, TaskFailure>> = self
            .pool
            .install(|| batch.par_iter().map(|task| run_task(task, evaluator)).collect());

        check_completeness(batch, &outcomes)?;
        for failure in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            if self.config.fatal_task_failures {
                return Err(SchedulerError::FatalTask(Box::new(failure.clone())));
            }
            warn!(%failure, "task failed");
        }
        Ok(outcomes)
    }
}

fn run_task<E: Evaluate + ?Sized>(task: &Task<'_>, evaluator: &E) -> Result<TaskResult, TaskFailure> {
    let worker = rayon::current_thread_index().unwrap_or(0);
    let failure = |cause| TaskFailure {
        task_id: task.id,
        genome_id: task.genome.id(),
        worker,
        cause,
    };

    let evaluation = panic::catch_unwind(AssertUnwindSafe(|| {
        evaluator.evaluate(task.genome, task.samples.clone(), task.base_seed)
    }))
    .map_err(|payload| failure(FailureCause::Panicked(panic_message(payload))))?;

    if evaluation.successes == 0 {
        return Err(failure(FailureCause::Trials(evaluation.failures)));
    }
    Ok(TaskResult {
        task_id: task.id,
        genome_id: task.genome.id(),
        sample: task.samples.start,
        fitness: evaluation.fitness,
        successes: evaluation.successes,
        failed_samples: evaluation.failures,
        worker,
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

fn check_completeness(
    batch: &[Task<'_>],
    outcomes: &[Result<TaskResult, TaskFailure>],
) -> Result<(), SchedulerError> {
    let mut reported = BTreeSet::new();
    for outcome in outcomes {
        let task_id = match outcome {
            Ok(result) => result.task_id,
            Err(failure) => failure.task_id,
        };
        if !reported.insert(task_id) {
            return Err(SchedulerError::DuplicateResult(task_id));
        }
    }
    match batch.iter().find(|task| !reported.contains(&task.id)) {
        Some(task) => Err(SchedulerError::MissingResult(task.id)),
        None => Ok(()),
    }
}

/// Splits `genomes` into tasks of the given granularity,
/// numbered from zero.
pub fn make_batch<'a>(
    genomes: &'a [Genome],
    samples: usize,
    granularity: Granularity,
    base_seed: u64,
) -> Vec<Task<'a>> {
    let ranges: Vec<Range<usize>> = match granularity {
        Granularity::PerGenome => vec![0..samples],
        Granularity::PerSample => (0..samples).map(|s| s..s + 1).collect(),
    };
    genomes
        .iter()
        .flat_map(|genome| ranges.iter().map(move |range| (genome, range.clone())))
        .enumerate()
        .map(|(id, (genome, samples))| Task {
            id,
            genome,
            samples,
            base_seed,
        })
        .collect()
}
