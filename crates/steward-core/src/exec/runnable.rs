//! RunnableTask: the live, in-process representation of one task tree.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{
    ErrorCode, StewardError, TaskError, TaskId, TaskRecord, TaskState, TaskType,
};
use crate::lock::ResourceLocks;
use crate::records::TaskRecords;

use super::cache::TaskCache;
use super::context::TaskContext;
use super::group::{SubTaskGroup, SubTaskUnit};

/// Executes one task tree and keeps its records consistent with progress.
///
/// Owned by the executor's registry, keyed by the root task id, and destroyed
/// once the tree's terminal record is persisted. Cancellation is cooperative:
/// aborting cancels the token, and subtasks observe it at `wait_for` and at
/// unit-of-work start.
pub struct RunnableTask {
    root_id: TaskId,
    owner: String,
    records: Arc<TaskRecords>,
    resources: Arc<ResourceLocks>,
    cache: TaskCache,
    cancel: CancellationToken,
    groups: Mutex<VecDeque<SubTaskGroup>>,
    next_position: AtomicU32,
    pool: Arc<tokio::sync::Semaphore>,
}

impl RunnableTask {
    pub(crate) fn new(
        root_id: TaskId,
        owner: String,
        records: Arc<TaskRecords>,
        resources: Arc<ResourceLocks>,
        pool: Arc<tokio::sync::Semaphore>,
    ) -> Self {
        Self {
            root_id,
            owner,
            records,
            resources,
            cache: TaskCache::new(),
            cancel: CancellationToken::new(),
            groups: Mutex::new(VecDeque::new()),
            next_position: AtomicU32::new(0),
            pool,
        }
    }

    /// Root task identifier of this tree.
    pub fn task_id(&self) -> TaskId {
        self.root_id
    }

    pub fn task_cache(&self) -> &TaskCache {
        &self.cache
    }

    /// Request cooperative cancellation of the whole tree.
    pub fn abort(&self) {
        info!(task = %self.root_id, "abort requested");
        self.cancel.cancel();
    }

    pub fn is_abort_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Abort-aware sleep: returns the instant the tree is cancelled instead
    /// of running the timer out. Unconditional sleeping in subtasks defeats
    /// cancellation; all blocking and polling goes through here.
    pub async fn wait_for(&self, duration: Duration) -> Result<(), StewardError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(StewardError::Cancelled(self.root_id)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Clear queued groups so a task can rebuild its plan.
    pub async fn reset(&self) {
        self.groups.lock().await.clear();
    }

    /// Queue a group; groups run strictly in the order added.
    pub async fn add_sub_task_group(&self, group: SubTaskGroup) {
        self.groups.lock().await.push_back(group);
    }

    pub(crate) fn context_for(
        self: &Arc<Self>,
        task_id: TaskId,
        params: serde_json::Value,
    ) -> TaskContext {
        TaskContext::new(
            task_id,
            self.root_id,
            params,
            Arc::clone(self),
            Arc::clone(&self.records),
            Arc::clone(&self.resources),
        )
    }

    /// Run every queued group to completion, in order.
    ///
    /// A group starts only after the previous one has fully finished. A
    /// member failure stops the tree with `SubtaskFailure` unless the group
    /// ignores errors; an observed abort stops it with `Cancelled` either
    /// way.
    pub async fn run_sub_tasks(self: &Arc<Self>) -> Result<(), StewardError> {
        loop {
            let group = self.groups.lock().await.pop_front();
            let Some(group) = group else {
                return Ok(());
            };
            self.run_group(group).await?;
        }
    }

    async fn run_group(self: &Arc<Self>, mut group: SubTaskGroup) -> Result<(), StewardError> {
        if self.is_abort_requested() {
            return Err(StewardError::Cancelled(self.root_id));
        }
        info!(
            task = %self.root_id,
            group = group.name(),
            group_type = %group.group_type(),
            sub_tasks = group.len(),
            "starting subtask group"
        );

        // Persist every member's record before any of them starts, so the
        // phase view sees the whole group as Created up front.
        let units = std::mem::take(&mut group.sub_tasks);
        let mut planned: Vec<(TaskId, SubTaskUnit)> = Vec::with_capacity(units.len());
        for unit in units {
            let position = self.next_position.fetch_add(1, Ordering::SeqCst);
            let id = TaskId::generate();
            let record = TaskRecord::new_sub_task(
                id,
                self.root_id,
                position,
                unit.task_type.clone(),
                group.group_type().clone(),
                unit.params.clone(),
                self.owner.clone(),
            );
            self.records.create(record).await?;
            planned.push((id, unit));
        }

        let mut handles: Vec<(TaskId, TaskType, JoinHandle<Result<(), StewardError>>)> =
            Vec::with_capacity(planned.len());
        for (id, unit) in planned {
            let runnable = Arc::clone(self);
            let task_type = unit.task_type.clone();
            let handle = tokio::spawn(async move { runnable.run_sub_task(id, unit).await });
            handles.push((id, task_type, handle));
        }

        // Full join barrier: the next group never starts before every member
        // of this one has finished.
        let mut cancelled = false;
        let mut failures: Vec<(TaskId, TaskType, String)> = Vec::new();
        for (id, task_type, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_cancelled() => cancelled = true,
                Ok(Err(err)) => failures.push((id, task_type, err.to_string())),
                Err(join_err) => {
                    let message = format!("subtask panicked: {join_err}");
                    warn!(task = %id, %message, "subtask join error");
                    let _ = self
                        .records
                        .update_in_txn(id, |r| {
                            r.set_error(TaskError::new(ErrorCode::InternalError, &message));
                            r.transition(TaskState::Failure);
                        })
                        .await;
                    failures.push((id, task_type, message));
                }
            }
        }

        if cancelled {
            return Err(StewardError::Cancelled(self.root_id));
        }
        if !failures.is_empty() {
            if group.ignore_errors() {
                warn!(
                    task = %self.root_id,
                    group = group.name(),
                    failed = failures.len(),
                    "group had failures; ignore_errors set, continuing"
                );
            } else {
                let (task_id, task_type, message) = failures.swap_remove(0);
                return Err(StewardError::SubtaskFailure {
                    task_id,
                    task_type,
                    message,
                });
            }
        }
        Ok(())
    }

    /// Execute one subtask end to end, recording its terminal state.
    async fn run_sub_task(
        self: Arc<Self>,
        id: TaskId,
        unit: SubTaskUnit,
    ) -> Result<(), StewardError> {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| StewardError::Other("subtask pool closed".to_string()))?;

        // A unit of work about to start must decline under a pending abort.
        if self.is_abort_requested() {
            self.records
                .update_in_txn(id, |r| {
                    r.set_error(TaskError::new(
                        ErrorCode::Cancelled,
                        "aborted before start",
                    ));
                    r.transition(TaskState::Aborted);
                })
                .await?;
            return Err(StewardError::Cancelled(id));
        }

        self.records
            .update_in_txn(id, |r| {
                r.transition(TaskState::Running);
            })
            .await?;

        let ctx = self.context_for(id, unit.params.clone());
        let result = unit.task.run(&ctx).await;

        match &result {
            Ok(()) => {
                self.records
                    .update_in_txn(id, |r| {
                        r.transition(TaskState::Success);
                    })
                    .await?;
            }
            Err(err) if err.is_cancelled() => {
                self.records
                    .update_in_txn(id, |r| {
                        r.set_error(TaskError::new(ErrorCode::Cancelled, err.to_string()));
                        r.transition(TaskState::Aborted);
                    })
                    .await?;
            }
            Err(err) => {
                warn!(task = %id, task_type = %unit.task_type, error = %err, "subtask failed");
                self.records
                    .update_in_txn(id, |r| {
                        r.set_error(TaskError::new(ErrorCode::InternalError, err.to_string()));
                        r.transition(TaskState::Failure);
                    })
                    .await?;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GroupType, TaskType};
    use crate::impls::InMemoryTaskStore;
    use async_trait::async_trait;

    fn runnable() -> (Arc<RunnableTask>, Arc<TaskRecords>) {
        let records = Arc::new(TaskRecords::new(Arc::new(InMemoryTaskStore::new())));
        let runnable = Arc::new(RunnableTask::new(
            TaskId::generate(),
            "owner-1".to_string(),
            Arc::clone(&records),
            Arc::new(ResourceLocks::new()),
            Arc::new(tokio::sync::Semaphore::new(8)),
        ));
        (runnable, records)
    }

    async fn insert_root(records: &TaskRecords, runnable: &RunnableTask) {
        records
            .create(TaskRecord::new(
                runnable.task_id(),
                TaskType::new("test.root.v1"),
                serde_json::json!({}),
                "owner-1".to_string(),
            ))
            .await
            .unwrap();
    }

    struct RecordingTask {
        marker: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl super::super::task::Task for RecordingTask {
        fn task_type(&self) -> TaskType {
            TaskType::new("test.recording.v1")
        }

        async fn run(&self, _ctx: &TaskContext) -> Result<(), StewardError> {
            self.order.lock().await.push(self.marker);
            if self.fail {
                return Err(StewardError::Other(format!("{} failed", self.marker)));
            }
            Ok(())
        }
    }

    struct SleepyTask;

    #[async_trait]
    impl super::super::task::Task for SleepyTask {
        fn task_type(&self) -> TaskType {
            TaskType::new("test.sleepy.v1")
        }

        async fn run(&self, ctx: &TaskContext) -> Result<(), StewardError> {
            ctx.wait_for(Duration::from_secs(10)).await
        }
    }

    #[tokio::test]
    async fn groups_run_in_insertion_order() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        for (index, marker) in ["first", "second", "third"].iter().enumerate() {
            let mut group = SubTaskGroup::new(
                format!("group-{index}"),
                GroupType::new(format!("G{index}")),
                false,
            );
            group.add_sub_task(
                Arc::new(RecordingTask {
                    marker,
                    order: Arc::clone(&order),
                    fail: false,
                }),
                serde_json::json!({}),
            );
            runnable.add_sub_task_group(group).await;
        }

        runnable.run_sub_tasks().await.unwrap();
        assert_eq!(*order.lock().await, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn failure_stops_later_groups() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut failing = SubTaskGroup::new("failing", GroupType::new("A"), false);
        failing.add_sub_task(
            Arc::new(RecordingTask {
                marker: "boom",
                order: Arc::clone(&order),
                fail: true,
            }),
            serde_json::json!({}),
        );
        let mut after = SubTaskGroup::new("after", GroupType::new("B"), false);
        after.add_sub_task(
            Arc::new(RecordingTask {
                marker: "after",
                order: Arc::clone(&order),
                fail: false,
            }),
            serde_json::json!({}),
        );
        runnable.add_sub_task_group(failing).await;
        runnable.add_sub_task_group(after).await;

        let err = runnable.run_sub_tasks().await.unwrap_err();
        assert!(matches!(err, StewardError::SubtaskFailure { .. }));
        assert_eq!(*order.lock().await, vec!["boom"]);
    }

    #[tokio::test]
    async fn ignore_errors_lets_the_tree_continue() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tolerant = SubTaskGroup::new("tolerant", GroupType::new("A"), true);
        tolerant.add_sub_task(
            Arc::new(RecordingTask {
                marker: "boom",
                order: Arc::clone(&order),
                fail: true,
            }),
            serde_json::json!({}),
        );
        tolerant.add_sub_task(
            Arc::new(RecordingTask {
                marker: "ok-1",
                order: Arc::clone(&order),
                fail: false,
            }),
            serde_json::json!({}),
        );
        tolerant.add_sub_task(
            Arc::new(RecordingTask {
                marker: "ok-2",
                order: Arc::clone(&order),
                fail: false,
            }),
            serde_json::json!({}),
        );
        let mut after = SubTaskGroup::new("after", GroupType::new("B"), false);
        after.add_sub_task(
            Arc::new(RecordingTask {
                marker: "after",
                order: Arc::clone(&order),
                fail: false,
            }),
            serde_json::json!({}),
        );
        runnable.add_sub_task_group(tolerant).await;
        runnable.add_sub_task_group(after).await;

        runnable.run_sub_tasks().await.unwrap();

        // The failing member's record still shows the failure.
        let sub_tasks = records.sub_tasks(runnable.task_id()).await.unwrap();
        let failed: Vec<_> = sub_tasks
            .iter()
            .filter(|r| r.state == TaskState::Failure)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error().is_some());
        assert!(order.lock().await.contains(&"after"));
    }

    #[tokio::test]
    async fn wait_for_returns_promptly_on_abort() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;

        let mut group = SubTaskGroup::new("sleepy", GroupType::new("A"), false);
        group.add_sub_task(Arc::new(SleepyTask), serde_json::json!({}));
        runnable.add_sub_task_group(group).await;

        let run = {
            let runnable = Arc::clone(&runnable);
            tokio::spawn(async move { runnable.run_sub_tasks().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        runnable.abort();

        // Far less than the 10s the subtask asked to sleep.
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(StewardError::Cancelled(_))));

        let sub_tasks = records.sub_tasks(runnable.task_id()).await.unwrap();
        assert_eq!(sub_tasks[0].state, TaskState::Aborted);
    }

    #[tokio::test]
    async fn reset_clears_queued_groups() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut group = SubTaskGroup::new("dropped", GroupType::new("A"), false);
        group.add_sub_task(
            Arc::new(RecordingTask {
                marker: "dropped",
                order: Arc::clone(&order),
                fail: false,
            }),
            serde_json::json!({}),
        );
        runnable.add_sub_task_group(group).await;
        runnable.reset().await;

        runnable.run_sub_tasks().await.unwrap();
        assert!(order.lock().await.is_empty());
    }

    #[tokio::test]
    async fn subtask_records_get_sequential_positions() {
        let (runnable, records) = runnable();
        insert_root(&records, &runnable).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        for group_index in 0..2 {
            let mut group = SubTaskGroup::new(
                format!("group-{group_index}"),
                GroupType::new("A"),
                false,
            );
            for _ in 0..2 {
                group.add_sub_task(
                    Arc::new(RecordingTask {
                        marker: "x",
                        order: Arc::clone(&order),
                        fail: false,
                    }),
                    serde_json::json!({}),
                );
            }
            runnable.add_sub_task_group(group).await;
        }

        runnable.run_sub_tasks().await.unwrap();

        let sub_tasks = records.sub_tasks(runnable.task_id()).await.unwrap();
        let positions: Vec<u32> = sub_tasks.iter().filter_map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }
}
