// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    AgentTask, BackgroundProcessor, ConversationId, QueueError, TaskId, TaskJob, TaskRepository,
};

const SHUTDOWN_REASON: &str = "queue shut down";

/// Bounded job queue drained by a pool of workers.
///
/// A job whose task id is already queued or running is rejected, so a
/// redelivered job cannot be processed twice concurrently.
pub struct TaskQueue {
    processor: Arc<BackgroundProcessor>,
    tx: mpsc::Sender<TaskJob>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskJob>>>,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    pub fn new(processor: Arc<BackgroundProcessor>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            processor,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> &Arc<dyn TaskRepository> {
        self.processor.tasks()
    }

    /// Create a `Queued` task and enqueue it.  Waits while the queue is full.
    pub async fn submit(
        &self,
        user_id: &str,
        description: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<TaskId, QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::QueueClosed);
        }
        let task = AgentTask::new(user_id, description, conversation_id.clone());
        let job = TaskJob {
            task_id: task.task_id.clone(),
            user_id: user_id.to_string(),
            description: description.to_string(),
            conversation_id,
        };
        self.tasks().create(task).await?;
        if let Err(e) = self.enqueue(job.clone()).await {
            self.processor.abandon(&job, SHUTDOWN_REASON).await;
            return Err(e);
        }
        info!(task_id = %job.task_id, user_id, "task queued");
        Ok(job.task_id)
    }

    /// Put a job on the queue.  Rejected while the same task is in flight.
    pub async fn enqueue(&self, job: TaskJob) -> Result<(), QueueError> {
        if !lock(&self.in_flight).insert(job.task_id.clone()) {
            warn!(task_id = %job.task_id, "duplicate delivery rejected");
            return Err(QueueError::AlreadyClaimed(job.task_id.to_string()));
        }
        let task_id = job.task_id.clone();
        if self.shutdown.is_cancelled() || self.tx.send(job).await.is_err() {
            lock(&self.in_flight).remove(&task_id);
            return Err(QueueError::QueueClosed);
        }
        Ok(())
    }

    /// Start `n` workers sharing the job receiver.
    pub fn spawn_workers(&self, n: usize) {
        let mut workers = lock(&self.workers);
        for id in 0..n {
            let rx = Arc::clone(&self.rx);
            let processor = Arc::clone(&self.processor);
            let in_flight = Arc::clone(&self.in_flight);
            let shutdown = self.shutdown.clone();
            workers.push(tokio::spawn(async move {
                debug!(worker = id, "worker started");
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    let Some(job) = job else { break };
                    debug!(worker = id, task_id = %job.task_id, "job received");
                    if let Err(e) = processor.run_job(&job, shutdown.child_token()).await {
                        warn!(worker = id, task_id = %job.task_id, "job not run: {e}");
                    }
                    lock(&in_flight).remove(&job.task_id);
                }
                debug!(worker = id, "worker stopped");
            }));
        }
    }

    pub async fn get(&self, task_id: &TaskId, user_id: &str) -> Result<AgentTask, QueueError> {
        self.tasks().get(task_id, user_id).await
    }

    /// Poll until the task reaches `Completed` or `Failed`.
    pub async fn wait_for_terminal(
        &self,
        task_id: &TaskId,
        user_id: &str,
        poll: Duration,
    ) -> Result<AgentTask, QueueError> {
        loop {
            let task = self.get(task_id, user_id).await?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Stop accepting jobs, cancel running ones and wait for the workers.
    /// Jobs still waiting in the channel are failed so their tasks reach a
    /// terminal status.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for h in handles {
            let _ = h.await;
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut drained = 0usize;
        while let Ok(job) = rx.try_recv() {
            self.processor.abandon(&job, SHUTDOWN_REASON).await;
            lock(&self.in_flight).remove(&job.task_id);
            drained += 1;
        }
        info!(drained, "task queue stopped");
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
