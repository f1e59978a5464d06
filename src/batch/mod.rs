//! Parallel mask production over many slides.
//!
//! Tasks are queued on a channel shared by a fixed number of workers. Each
//! worker pulls the next task and runs it on tokio's blocking pool, so decode
//! and filtering work never stalls the runtime. A failed task is recorded in
//! the [`BatchReport`] and the worker moves on; there are no retries.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::MaskError;
use crate::mask::{process_task, MaskOutputs, MaskTask, OutputLayout};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

// =============================================================================
// Report
// =============================================================================

/// A task that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub slide_id: String,
    pub message: String,
}

/// Outcome of a batch, in completion order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<MaskOutputs>,
    pub failed: Vec<TaskFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Produce masks for every task with `workers` concurrent workers.
pub async fn run_batch(tasks: Vec<MaskTask>, workers: usize, layout: OutputLayout) -> BatchReport {
    let layout = Arc::new(layout);
    run_batch_with(tasks, workers, move |task| process_task(task, &layout)).await
}

/// Run `process` over every task with `workers` concurrent workers.
///
/// `process` runs on the blocking pool; a panic inside it fails only the
/// task that raised it.
pub async fn run_batch_with<F>(tasks: Vec<MaskTask>, workers: usize, process: F) -> BatchReport
where
    F: Fn(&MaskTask) -> Result<MaskOutputs, MaskError> + Send + Sync + 'static,
{
    let workers = workers.max(1);
    let total = tasks.len();
    info!(tasks = total, workers, "Starting mask batch");

    let (sender, receiver) = mpsc::unbounded_channel();
    for task in tasks {
        if sender.send(task).is_err() {
            break;
        }
    }
    drop(sender);

    let receiver = Arc::new(Mutex::new(receiver));
    let process = Arc::new(process);

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let receiver = Arc::clone(&receiver);
        let process = Arc::clone(&process);
        handles.push(tokio::spawn(async move {
            worker_loop(worker, receiver, process).await
        }));
    }

    let mut report = BatchReport::default();
    for handle in handles {
        match handle.await {
            Ok(outcomes) => {
                for (slide_id, outcome) in outcomes {
                    match outcome {
                        Ok(outputs) => report.succeeded.push(outputs),
                        Err(message) => report.failed.push(TaskFailure { slide_id, message }),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Batch worker stopped unexpectedly"),
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Mask batch complete"
    );
    report
}

type Outcome = (String, Result<MaskOutputs, String>);

async fn worker_loop<F>(
    worker: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<MaskTask>>>,
    process: Arc<F>,
) -> Vec<Outcome>
where
    F: Fn(&MaskTask) -> Result<MaskOutputs, MaskError> + Send + Sync + 'static,
{
    let mut outcomes = Vec::new();

    loop {
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        let slide_id = task.slide_id.clone();
        let process = Arc::clone(&process);
        let outcome = match tokio::task::spawn_blocking(move || process(&task)).await {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("task aborted: {}", e)),
        };

        if let Err(message) = &outcome {
            warn!(worker, slide_id = %slide_id, error = %message, "Mask task failed");
        }
        outcomes.push((slide_id, outcome));
    }

    outcomes
}
