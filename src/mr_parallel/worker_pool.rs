use std::sync::Arc;

use clap::ValueEnum;
use itertools::Itertools;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::common::{KeyValue, MapReduceApp, Task, TaskKind};
use crate::error::{MrError, Result};
use crate::partition::partition_pairs;
use crate::storage::Storage;

use super::coordinator::Coordinator;

/// How a worker asks the coordinator for its next task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ClaimMode {
    /// Block until a task shows up or the run ends.
    #[default]
    Wait,
    /// Take a task if one is pending, otherwise exit. A worker that finds the
    /// queue empty before the reduce tasks exist never comes back for them.
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: String,
    pub map_tasks: usize,
    pub reduce_tasks: usize,
}

pub struct Worker {
    pub id: String,
    coordinator: Arc<Coordinator>,
    storage: Arc<dyn Storage>,
    app: Arc<dyn MapReduceApp>,
    mode: ClaimMode,
}

impl Worker {
    pub fn new(
        coordinator: Arc<Coordinator>,
        storage: Arc<dyn Storage>,
        app: Arc<dyn MapReduceApp>,
        mode: ClaimMode,
    ) -> Worker {
        Worker {
            id: Uuid::new_v4().to_string(),
            coordinator,
            storage,
            app,
            mode,
        }
    }

    fn claim(&self) -> Option<Task> {
        match self.mode {
            ClaimMode::Wait => self.coordinator.next_task(),
            ClaimMode::Poll => self.coordinator.claim_task(),
        }
    }

    /// Runs tasks until none is left. The first task that fails, or whose
    /// completion is refused, is abandoned and ends the loop with its error.
    pub fn run(&self) -> Result<WorkerReport> {
        info!("Worker {} started", self.id);
        let mut report = WorkerReport {
            worker_id: self.id.clone(),
            map_tasks: 0,
            reduce_tasks: 0,
        };

        while let Some(task) = self.claim() {
            self.handle(&task)?;
            match task.kind() {
                TaskKind::Map => report.map_tasks += 1,
                TaskKind::Reduce => report.reduce_tasks += 1,
            }
        }

        info!(
            "No more tasks, worker {} shutting down ({} map, {} reduce)",
            self.id, report.map_tasks, report.reduce_tasks
        );
        Ok(report)
    }

    fn handle(&self, task: &Task) -> Result<()> {
        debug!("Worker {} starting {}", self.id, task);
        let result = match task {
            Task::Map {
                id,
                input,
                reduce_count,
            } => self.execute_map(*id, input, *reduce_count),
            Task::Reduce { id } => self.execute_reduce(*id),
        }
        .and_then(|()| self.coordinator.report_completion(task));

        match result {
            Ok(()) => {
                debug!("Worker {} finished {}", self.id, task);
                Ok(())
            }
            Err(err) => {
                error!("Worker {} failed {}: {}", self.id, task, err);
                self.coordinator.abandon(task);
                Err(err)
            }
        }
    }

    fn execute_map(&self, id: usize, input: &str, reduce_count: usize) -> Result<()> {
        let contents = self.storage.read_input(input)?;
        let key_values = self.app.map(input, &contents);
        debug!("map#{} produced {} pairs", id, key_values.len());

        for (bucket, pairs) in partition_pairs(key_values, reduce_count)
            .iter()
            .enumerate()
        {
            self.storage.write_intermediate(id, bucket, pairs)?;
        }
        Ok(())
    }

    fn execute_reduce(&self, id: usize) -> Result<()> {
        let mut intermediate: Vec<KeyValue> = Vec::new();
        for map_id in 0..self.coordinator.map_count() {
            intermediate.extend(self.storage.read_intermediate(map_id, id)?);
        }
        // stable, equal keys keep map-task order
        intermediate.sort_by(|a, b| a.key.cmp(&b.key));

        let groups = intermediate.into_iter().chunk_by(|kv| kv.key.clone());
        let mut written = 0;
        for (key, group) in &groups {
            let values: Vec<String> = group.map(|kv| kv.value).collect();
            let output = self
                .app
                .reduce(&key, &values)
                .map_err(|source| MrError::Application {
                    key: key.clone(),
                    source,
                })?;
            self.storage.write_result(&key, &output)?;
            written += 1;
        }
        debug!("reduce#{} wrote {} results", id, written);
        Ok(())
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<Result<WorkerReport>>>,
}

impl WorkerPool {
    /// Spawns `size` workers on tokio's blocking pool.
    pub fn new(
        size: usize,
        coordinator: Arc<Coordinator>,
        storage: Arc<dyn Storage>,
        app: Arc<dyn MapReduceApp>,
        mode: ClaimMode,
    ) -> WorkerPool {
        assert!(size > 0);

        let workers = (0..size)
            .map(|_| {
                let worker = Worker::new(
                    Arc::clone(&coordinator),
                    Arc::clone(&storage),
                    Arc::clone(&app),
                    mode,
                );
                tokio::task::spawn_blocking(move || worker.run())
            })
            .collect();

        WorkerPool { workers }
    }

    /// Waits for every worker to stop and returns what each one did.
    pub async fn wait(self) -> Vec<Result<WorkerReport>> {
        futures::future::join_all(self.workers)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(err) => Err(MrError::WorkerPanicked(err.to_string())),
            })
            .collect()
    }
}
