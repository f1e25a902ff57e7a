//! Worker pool running queued method calls.
//!
//! N worker tasks drain one bounded queue. Submission never waits: a full or
//! closed queue rejects the job immediately, and the rejection is reported to
//! the caller instead of being retried. A job the queue accepted always runs,
//! shutdown included.

use futures::future::BoxFuture;
use opcua::types::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex as AsyncMutex,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ua_model_error::ModelResult;

pub type Job = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum JobRejected {
    #[error("job queue is full")]
    QueueFull,
    #[error("worker pool is shut down")]
    ShutDown,
}

impl JobRejected {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobRejected::QueueFull => StatusCode::BadResourceUnavailable,
            JobRejected::ShutDown => StatusCode::BadShutdown,
        }
    }
}

/// The dispatcher's only view of the concurrency infrastructure.
pub trait JobQueue: Send + Sync + 'static {
    fn add_job(&self, job: Job) -> Result<(), JobRejected>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    #[serde(default = "WorkerPoolConfig::workers_default")]
    pub workers: usize,
    #[serde(default = "WorkerPoolConfig::queue_capacity_default")]
    pub queue_capacity: usize,
}

impl WorkerPoolConfig {
    fn workers_default() -> usize {
        4
    }

    fn queue_capacity_default() -> usize {
        64
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: Self::workers_default(),
            queue_capacity: Self::queue_capacity_default(),
        }
    }
}

pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    shutdown_token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the workers on the current tokio runtime.
    pub fn start(config: &WorkerPoolConfig, shutdown_token: CancellationToken) -> Arc<Self> {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let token = shutdown_token.clone();
                tokio::spawn(async move {
                    debug!(worker, "Method worker started");
                    loop {
                        // Queued jobs win over cancellation so accepted work drains.
                        let job = tokio::select! {
                            biased;
                            job = async { rx.lock().await.recv().await } => job,
                            _ = token.cancelled() => break,
                        };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    debug!(worker, "Method worker stopped");
                })
            })
            .collect();

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );
        Arc::new(Self {
            tx,
            rx,
            shutdown_token,
            workers: Mutex::new(handles),
        })
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stop accepting jobs and wait for the workers. Every job accepted
    /// before the call still runs to completion.
    pub async fn shutdown(&self) -> ModelResult<()> {
        self.shutdown_token.cancel();
        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            handle.await?;
        }

        // A submission racing the cancel can land after the last worker left.
        let mut rx = self.rx.lock().await;
        rx.close();
        let mut leftover = 0usize;
        while let Some(job) = rx.recv().await {
            job.await;
            leftover += 1;
        }
        if leftover > 0 {
            debug!(leftover, "Ran jobs queued during shutdown");
        }
        info!("Worker pool stopped");
        Ok(())
    }
}

impl JobQueue for WorkerPool {
    fn add_job(&self, job: Job) -> Result<(), JobRejected> {
        if self.is_shut_down() {
            return Err(JobRejected::ShutDown);
        }
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    capacity = self.tx.max_capacity(),
                    "Job rejected: queue full"
                );
                Err(JobRejected::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Job rejected: queue closed");
                Err(JobRejected::ShutDown)
            }
        }
    }
}
