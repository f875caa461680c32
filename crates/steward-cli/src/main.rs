use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use steward_core::domain::{GroupType, ResourceId, StewardError, TaskType};
use steward_core::exec::{
    ExecutorConfig, Task, TaskContext, TaskExecutor, TaskFactory, TaskRegistry,
};
use steward_core::impls::InMemoryTaskStore;
use steward_core::lock::{ANY_VERSION, ResourceLocks};
use steward_core::records::TaskRecords;

#[derive(Debug, Deserialize)]
struct CreateClusterParams {
    resource: ResourceId,
    nodes: u32,
}

/// Leaf: pretend to provision one node, reporting progress into the cache.
struct ProvisionNode;

#[async_trait]
impl Task for ProvisionNode {
    fn task_type(&self) -> TaskType {
        TaskType::new("node.provision.v1")
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), StewardError> {
        for step in 1..=4u32 {
            ctx.wait_for(Duration::from_millis(100)).await?;
            ctx.task_cache()
                .put(ctx.task_id(), serde_json::json!({ "step": step, "of": 4 }));
        }
        Ok(())
    }
}

/// Leaf: pretend to start the database software on one node.
struct StartProcesses;

#[async_trait]
impl Task for StartProcesses {
    fn task_type(&self) -> TaskType {
        TaskType::new("node.start.v1")
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), StewardError> {
        ctx.wait_for(Duration::from_millis(150)).await
    }
}

/// Root: lock the cluster, provision every node, then start processes.
struct CreateCluster;

#[async_trait]
impl Task for CreateCluster {
    fn task_type(&self) -> TaskType {
        TaskType::new("cluster.create.v1")
    }

    fn validate_params(
        &self,
        params: &serde_json::Value,
        _is_first_try: bool,
    ) -> Result<(), StewardError> {
        let params: CreateClusterParams = serde_json::from_value(params.clone())
            .map_err(|e| StewardError::Other(format!("bad params: {e}")))?;
        if params.nodes == 0 {
            return Err(StewardError::Other("nodes must be positive".to_string()));
        }
        Ok(())
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), StewardError> {
        let params: CreateClusterParams = serde_json::from_value(ctx.params().clone())
            .map_err(|e| StewardError::Other(format!("bad params: {e}")))?;

        ctx.resources()
            .lock(params.resource, ctx.task_id(), ANY_VERSION)
            .await?;

        let outcome = self.run_locked(ctx, &params).await;
        ctx.resources()
            .unlock(params.resource, outcome.is_ok())
            .await?;
        outcome
    }
}

impl CreateCluster {
    async fn run_locked(
        &self,
        ctx: &TaskContext,
        params: &CreateClusterParams,
    ) -> Result<(), StewardError> {
        let mut provision =
            ctx.create_sub_task_group("provision-nodes", GroupType::new("Provisioning"), false);
        for node in 0..params.nodes {
            provision.add_sub_task(Arc::new(ProvisionNode), serde_json::json!({ "node": node }));
        }
        ctx.add_sub_task_group(provision).await;

        let mut start =
            ctx.create_sub_task_group("start-processes", GroupType::new("Starting"), false);
        for node in 0..params.nodes {
            start.add_sub_task(Arc::new(StartProcesses), serde_json::json!({ "node": node }));
        }
        ctx.add_sub_task_group(start).await;

        ctx.run_sub_tasks().await
    }
}

fn factory<T: Task + Default + 'static>() -> TaskFactory {
    Arc::new(|_| Ok(Arc::new(T::default()) as Arc<dyn Task>))
}

impl Default for CreateCluster {
    fn default() -> Self {
        Self
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // (A) Wire the executor: store, record service, resource locks, registry.
    let records = Arc::new(TaskRecords::new(Arc::new(InMemoryTaskStore::new())));
    let resources = Arc::new(ResourceLocks::new());

    let mut registry = TaskRegistry::new();
    registry
        .register(TaskType::new("cluster.create.v1"), factory::<CreateCluster>())
        .expect("fresh registry");
    let registry = Arc::new(registry);

    let executor = Arc::new(TaskExecutor::new(
        ExecutorConfig::default(),
        registry,
        Arc::clone(&records),
        Arc::clone(&resources),
    ));

    // (B) Submit a cluster-create task for a 3-node cluster.
    let resource = ResourceId::generate();
    let id = executor
        .submit(
            TaskType::new("cluster.create.v1"),
            serde_json::json!({ "resource": resource, "nodes": 3 }),
        )
        .await
        .expect("submit");
    println!("submitted task: {id}");

    // (C) Poll progress until the record reaches a terminal state.
    loop {
        let record = records.get(id).await.expect("store").expect("record");
        let percent = records.percent_completed(id).await.expect("percent");
        let hints = match executor.get_runnable_task(id) {
            Ok(runnable) => runnable.task_cache().snapshot(),
            Err(_) => HashMap::new(),
        };
        let phases = records.user_task_details(id, &hints).await.expect("phases");

        println!("state={:?} percent={percent:.0}", record.state);
        for phase in &phases {
            println!("  phase {}: {:?}", phase.group_type, phase.state);
        }
        if record.has_completed() {
            if let Some(error) = record.error() {
                println!("error: {:?} {}", error.code, error.message);
            }
            break;
        }
        sleep(Duration::from_millis(200)).await;
    }

    // (D) Graceful shutdown; everything has drained by now.
    executor.shutdown().await;
    println!(
        "resource version after update: {}",
        resources.version(resource).await
    );
}
