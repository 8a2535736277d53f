mod coordinator;
mod worker_pool;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::common::{MapReduce, MapReduceApp, Output};
use crate::error::MrError;
use crate::storage::Storage;

pub use coordinator::{Coordinator, Phase};
pub use worker_pool::{ClaimMode, Worker, WorkerPool, WorkerReport};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub reduce_count: usize,
    pub workers: usize,
    pub claim_mode: ClaimMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reduce_count: 2,
            workers: 2,
            claim_mode: ClaimMode::Wait,
        }
    }
}

/// What a run achieved once every worker has stopped.
#[derive(Debug)]
pub struct RunOutcome {
    pub all_completed: bool,
    pub completed_tasks: usize,
    pub reports: Vec<WorkerReport>,
    pub failures: Vec<MrError>,
}

pub struct ParallelMapReduce {
    inputs: Vec<String>,
    mr_app: Arc<dyn MapReduceApp>,
    storage: Arc<dyn Storage>,
    options: RunOptions,
}

impl ParallelMapReduce {
    pub fn new(
        inputs: Vec<String>,
        mr_app: Arc<dyn MapReduceApp>,
        storage: Arc<dyn Storage>,
        options: RunOptions,
    ) -> Self {
        Self {
            inputs,
            mr_app,
            storage,
            options,
        }
    }

    pub async fn execute(self) -> anyhow::Result<RunOutcome> {
        self.execute_until(std::future::pending::<()>()).await
    }

    /// Runs the job. If `shutdown` resolves first the run is cancelled: pending
    /// tasks are dropped and the call returns once in-flight tasks finish.
    pub async fn execute_until<F>(self, shutdown: F) -> anyhow::Result<RunOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        if self.options.workers == 0 {
            return Err(MrError::InvalidConfig("need at least one worker".to_string()).into());
        }
        let coordinator = Arc::new(Coordinator::new(
            self.inputs.len(),
            self.options.reduce_count,
        )?);
        self.storage.clear_results()?;
        coordinator.enqueue_map_tasks(&self.inputs)?;

        info!(
            "Starting {} workers for {} map and {} reduce tasks",
            self.options.workers,
            coordinator.map_count(),
            coordinator.reduce_count()
        );
        let pool = WorkerPool::new(
            self.options.workers,
            Arc::clone(&coordinator),
            Arc::clone(&self.storage),
            Arc::clone(&self.mr_app),
            self.options.claim_mode,
        );

        let wait = pool.wait();
        tokio::pin!(wait);
        let results = tokio::select! {
            results = &mut wait => results,
            _ = shutdown => {
                coordinator.cancel();
                wait.await
            }
        };

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(err) => failures.push(err),
            }
        }

        let outcome = RunOutcome {
            all_completed: coordinator.all_tasks_completed(),
            completed_tasks: coordinator.completed_count(),
            reports,
            failures,
        };
        if outcome.all_completed {
            info!("All tasks completed.");
        } else {
            warn!(
                "Some tasks were not completed ({}/{} done, {} worker failures)",
                outcome.completed_tasks,
                coordinator.map_count() + coordinator.reduce_count(),
                outcome.failures.len()
            );
        }
        Ok(outcome)
    }
}

#[async_trait]
impl MapReduce for ParallelMapReduce {
    async fn run(self) -> anyhow::Result<Output> {
        let storage = Arc::clone(&self.storage);
        let outcome = self.execute().await?;
        if let Some(err) = outcome.failures.into_iter().next() {
            return Err(anyhow::Error::new(err).context("map-reduce run failed"));
        }
        if !outcome.all_completed {
            anyhow::bail!(
                "map-reduce run stopped after {} completed tasks",
                outcome.completed_tasks
            );
        }

        Ok(storage
            .read_results()?
            .into_iter()
            .map(|kv| (kv.key, kv.value))
            .collect())
    }
}
