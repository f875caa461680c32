//! Task executor: submission, tracking, abort and shutdown of task trees.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{
    ErrorCode, StewardError, TaskError, TaskId, TaskRecord, TaskState, TaskType,
};
use crate::lock::ResourceLocks;
use crate::records::TaskRecords;

use super::config::ExecutorConfig;
use super::runnable::RunnableTask;
use super::task::{Task, TaskRegistry};

/// Entry point of the orchestration core.
///
/// Owns the registry of task implementations, the table of live trees and the
/// shared subtask pool. One instance per process; every collaborator comes in
/// through the constructor so tests build fully isolated executors.
pub struct TaskExecutor {
    config: ExecutorConfig,
    registry: Arc<TaskRegistry>,
    records: Arc<TaskRecords>,
    resources: Arc<ResourceLocks>,
    running: std::sync::Mutex<HashMap<TaskId, Arc<RunnableTask>>>,
    pool: Arc<Semaphore>,
    shutting_down: AtomicBool,
}

impl TaskExecutor {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<TaskRegistry>,
        records: Arc<TaskRecords>,
        resources: Arc<ResourceLocks>,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.pool_size));
        Self {
            config,
            registry,
            records,
            resources,
            running: std::sync::Mutex::new(HashMap::new()),
            pool,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn records(&self) -> &Arc<TaskRecords> {
        &self.records
    }

    pub fn resources(&self) -> &Arc<ResourceLocks> {
        &self.resources
    }

    /// Instantiate a task implementation without submitting it.
    pub fn create_task(
        &self,
        task_type: &TaskType,
        params: &serde_json::Value,
    ) -> Result<Arc<dyn Task>, StewardError> {
        self.registry.create(task_type, params)
    }

    /// Validate, persist and start a new task tree; returns the root id.
    ///
    /// Invalid type and bad params are reported synchronously, before any
    /// record exists. Everything after this call is tracked through the
    /// record; the spawned tree outlives the caller.
    pub async fn submit(
        self: &Arc<Self>,
        task_type: TaskType,
        params: serde_json::Value,
    ) -> Result<TaskId, StewardError> {
        self.submit_attempt(task_type, params, None).await
    }

    /// Submit a new attempt of a previously failed or aborted task.
    ///
    /// The new record inherits the previous attempt's runtime info so the
    /// task can continue idempotently, and params are validated in
    /// continuation mode.
    pub async fn resubmit(
        self: &Arc<Self>,
        previous: TaskId,
    ) -> Result<TaskId, StewardError> {
        let prev = self.records.get_or_not_found(previous).await?;
        if !prev.has_completed() {
            return Err(StewardError::Other(format!(
                "task {previous} is still in state {:?}; only completed tasks can be retried",
                prev.state
            )));
        }
        self.submit_attempt(prev.task_type.clone(), prev.params.clone(), Some(prev))
            .await
    }

    async fn submit_attempt(
        self: &Arc<Self>,
        task_type: TaskType,
        params: serde_json::Value,
        previous: Option<TaskRecord>,
    ) -> Result<TaskId, StewardError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(StewardError::Other(
                "executor is shutting down; submission refused".to_string(),
            ));
        }

        let task = self.registry.create(&task_type, &params)?;
        task.validate_params(&params, previous.is_none())?;

        let id = TaskId::generate();
        let mut record = TaskRecord::new(id, task_type, params.clone(), self.config.owner.clone());
        if let Some(prev) = &previous {
            record.inherit(prev);
        }
        self.records.create(record).await?;

        let runnable = Arc::new(RunnableTask::new(
            id,
            self.config.owner.clone(),
            Arc::clone(&self.records),
            Arc::clone(&self.resources),
            Arc::clone(&self.pool),
        ));
        {
            let mut running = self.running.lock().expect("running table poisoned");
            running.insert(id, Arc::clone(&runnable));
        }

        info!(task = %id, task_type = %task.task_type(), "task submitted");
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.drive(runnable, task, params).await;
        });
        Ok(id)
    }

    /// Run one tree to its terminal record. Never propagates; the record is
    /// the sole report of the outcome.
    async fn drive(
        self: Arc<Self>,
        runnable: Arc<RunnableTask>,
        task: Arc<dyn Task>,
        params: serde_json::Value,
    ) {
        let id = runnable.task_id();
        let result = self.drive_inner(&runnable, task, params).await;

        let finalize = match &result {
            Ok(()) => {
                self.records
                    .update_in_txn(id, |r| {
                        r.transition(TaskState::Success);
                    })
                    .await
            }
            Err(err) if err.is_cancelled() => {
                self.abort_incomplete_sub_tasks(id).await;
                let message = err.to_string();
                self.records
                    .update_in_txn(id, move |r| {
                        // An earlier, more specific error (such as a platform
                        // shutdown) must not be replaced by the generic
                        // cancellation.
                        if r.details.error.is_none() {
                            r.set_error(TaskError::new(ErrorCode::Cancelled, message));
                        }
                        r.transition(TaskState::Aborted);
                    })
                    .await
            }
            Err(err) => {
                let message = err.to_string();
                self.records
                    .update_in_txn(id, move |r| {
                        r.set_error(TaskError::new(ErrorCode::InternalError, message));
                        r.transition(TaskState::Failure);
                    })
                    .await
            }
        };
        if let Err(err) = finalize {
            error!(task = %id, %err, "failed to persist terminal task state");
        }

        let mut running = self.running.lock().expect("running table poisoned");
        running.remove(&id);
        match result {
            Ok(()) => info!(task = %id, "task completed"),
            Err(err) => warn!(task = %id, %err, "task did not complete"),
        }
    }

    async fn drive_inner(
        &self,
        runnable: &Arc<RunnableTask>,
        task: Arc<dyn Task>,
        params: serde_json::Value,
    ) -> Result<(), StewardError> {
        let id = runnable.task_id();
        self.records
            .update_in_txn(id, |r| {
                r.transition(TaskState::Initializing);
            })
            .await?;
        if runnable.is_abort_requested() {
            return Err(StewardError::Cancelled(id));
        }
        self.records
            .update_in_txn(id, |r| {
                r.transition(TaskState::Running);
            })
            .await?;

        let ctx = runnable.context_for(id, params);
        task.run(&ctx).await
    }

    /// Subtasks the tree never got to run stay Created when the root aborts;
    /// mark them Aborted so the phase view converges.
    async fn abort_incomplete_sub_tasks(&self, root: TaskId) {
        let incomplete = match self.records.incomplete_sub_tasks(root).await {
            Ok(records) => records,
            Err(err) => {
                error!(task = %root, %err, "could not list incomplete subtasks");
                return;
            }
        };
        for record in incomplete {
            let result = self
                .records
                .update_in_txn(record.id, |r| {
                    r.set_error(TaskError::new(ErrorCode::Cancelled, "tree aborted"));
                    r.transition(TaskState::Aborted);
                })
                .await;
            if let Err(err) = result {
                error!(task = %record.id, %err, "could not mark subtask aborted");
            }
        }
    }

    /// Live tree for a running root task.
    pub fn get_runnable_task(&self, id: TaskId) -> Result<Arc<RunnableTask>, StewardError> {
        let running = self.running.lock().expect("running table poisoned");
        running.get(&id).cloned().ok_or(StewardError::NotFound(id))
    }

    /// Request cooperative cancellation of a running tree.
    ///
    /// The root record moves to `Abort` so observers can see the abort in
    /// progress; the tree's own cancellation handling finalizes it to
    /// `Aborted`. Returns `NotFound` when the task is not currently running,
    /// including when it already reached a terminal state.
    pub async fn abort_task(&self, id: TaskId) -> Result<(), StewardError> {
        let runnable = self.get_runnable_task(id)?;
        self.records
            .update_in_txn(id, |r| {
                r.transition(TaskState::Abort);
            })
            .await?;
        runnable.abort();
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Block a completed or running root task until it has a terminal record.
    pub async fn wait_for_task(
        &self,
        id: TaskId,
        timeout: Duration,
    ) -> Result<TaskRecord, StewardError> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.records.get_or_not_found(id).await?;
            if record.has_completed() {
                return Ok(record);
            }
            if Instant::now() >= deadline {
                return Err(StewardError::Other(format!(
                    "task {id} still in state {:?} after {timeout:?}",
                    record.state
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop accepting work and wait for running trees to drain.
    ///
    /// After the grace period any tree still running is aborted and its root
    /// record flagged with a platform-shutdown error; its own cancellation
    /// handling takes it to a terminal state from there.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!("executor shutting down");

        let deadline = Instant::now() + self.config.shutdown_grace;
        loop {
            let remaining: Vec<Arc<RunnableTask>> = {
                let running = self.running.lock().expect("running table poisoned");
                running.values().cloned().collect()
            };
            if remaining.is_empty() {
                info!("executor drained");
                return;
            }
            if Instant::now() >= deadline {
                warn!(remaining = remaining.len(), "grace elapsed, aborting remaining trees");
                for runnable in remaining {
                    let id = runnable.task_id();
                    let _ = self
                        .records
                        .update_in_txn(id, |r| {
                            r.set_error(TaskError::new(
                                ErrorCode::PlatformShutdown,
                                "platform shut down before the task finished",
                            ));
                            r.transition(TaskState::Abort);
                        })
                        .await;
                    runnable.abort();
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
