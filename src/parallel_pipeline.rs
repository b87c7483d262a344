// THEORY:
// The `parallel_pipeline` module runs many images through the engine at once.
// Analysing one image is CPU-bound and synchronous; a batch of them is
// embarrassingly parallel because no image depends on another.
//
// Key architectural principles:
// 1.  **Dispatcher and Workers**: One dispatcher task receives `ImageTask`s and hands
//     them round-robin to a fixed set of worker tasks. Every worker shares the same
//     immutable `TransductionPipeline`.
// 2.  **Blocking Work off the Reactor**: Workers run the synchronous pipeline inside
//     `spawn_blocking`, so the async side only moves tasks and results around.
// 3.  **One Answer per Task**: Each task carries a `oneshot` sender for its own
//     result. The batch awaits all of them and reassembles input order.
// 4.  **Skip, don't Abort**: An image that fails (a missing channel, for example) is
//     logged and recorded as skipped. The rest of the batch carries on.

use crate::config::TransductionConfig;
use crate::core_modules::channel_image::ChannelStack;
use crate::error::{ColocError, Result};
use crate::pipeline::{TransductionPipeline, TransductionResult};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{info, warn};

/// One named image waiting to be analysed.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub file_name: String,
    pub image: ChannelStack,
}

pub struct ImageTask {
    pub item: BatchItem,
    pub result_sender: oneshot::Sender<Result<TransductionResult>>,
}

/// An image that was left out of the batch, and why.
#[derive(Debug)]
pub struct SkippedImage {
    pub file_name: String,
    pub error: ColocError,
}

/// Outcome of a whole batch. `results` keeps input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<TransductionResult>,
    pub skipped: Vec<SkippedImage>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers on the current tokio runtime.
    pub fn new(pipeline: TransductionPipeline, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let pipeline = Arc::new(pipeline);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageTask>();
        let mut workers = Vec::with_capacity(worker_count + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ImageTask>())
            .unzip();

        // Spawn dispatcher
        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    let _ = task.result_sender.send(Err(ColocError::WorkerUnavailable));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        }));

        // Spawn workers
        for mut worker_receiver in worker_receivers {
            let worker_pipeline = Arc::clone(&pipeline);
            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let pipeline = Arc::clone(&worker_pipeline);
                    let item = task.item;
                    let joined =
                        tokio::task::spawn_blocking(move || pipeline.process(&item.image, &item.file_name)).await;
                    let _ = task.result_sender.send(flatten_join(joined));
                }
            }));
        }

        Self { task_sender, workers }
    }

    pub async fn process_image(&self, item: BatchItem) -> Result<TransductionResult> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = ImageTask { item, result_sender };

        self.task_sender
            .send(task)
            .map_err(|_| ColocError::WorkerUnavailable)?;

        result_receiver.await.map_err(|_| ColocError::WorkerUnavailable)?
    }

    /// Stops accepting work and waits for in-flight images to finish.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Unwraps a blocking analysis. A panic inside the pipeline is reported as
/// `WorkerPanicked`, never as a closed pool.
fn flatten_join(
    joined: std::result::Result<Result<TransductionResult>, JoinError>,
) -> Result<TransductionResult> {
    joined.unwrap_or_else(|error| {
        warn!(%error, "Analysis task failed");
        Err(ColocError::WorkerPanicked(error.to_string()))
    })
}

/// Runs whole batches of images through a shared worker pool.
pub struct BatchProcessor {
    worker_pool: WorkerPool,
}

impl BatchProcessor {
    /// One worker per logical CPU.
    pub fn new(config: TransductionConfig) -> Result<Self> {
        Self::with_workers(config, num_cpus::get())
    }

    pub fn with_workers(config: TransductionConfig, worker_count: usize) -> Result<Self> {
        let pipeline = TransductionPipeline::new(config)?;
        Ok(Self {
            worker_pool: WorkerPool::new(pipeline, worker_count),
        })
    }

    pub async fn process_batch(&self, items: Vec<BatchItem>) -> BatchReport {
        let file_names: Vec<String> = items.iter().map(|item| item.file_name.clone()).collect();
        let outcomes = join_all(items.into_iter().map(|item| self.worker_pool.process_image(item))).await;

        let mut report = BatchReport::default();
        for (file_name, outcome) in file_names.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(error) => {
                    warn!(file_name = %file_name, error = %error, "Skipping image");
                    report.skipped.push(SkippedImage { file_name, error });
                }
            }
        }

        info!(
            processed = report.results.len(),
            skipped = report.skipped.len(),
            "Batch finished"
        );
        report
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
