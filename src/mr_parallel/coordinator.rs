//! Task registry shared by every worker of a run.
//!
//! Pending tasks live in an unbounded channel. The completion counter and the
//! map -> reduce transition are guarded by a single mutex, and reduce tasks are
//! sent into the channel while that mutex is held.

use std::sync::{Mutex, MutexGuard};

use async_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::common::Task;
use crate::error::{MrError, Result};

/// Stage of a run, derived from the completion counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Map,
    Reduce,
    Done,
}

#[derive(Debug, Default)]
struct Progress {
    maps_enqueued: bool,
    completed: usize,
    reduce_enqueued: bool,
    map_done: Vec<bool>,
    reduce_done: Vec<bool>,
    abandoned: Vec<Task>,
}

pub struct Coordinator {
    map_count: usize,
    reduce_count: usize,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    progress: Mutex<Progress>,
}

impl Coordinator {
    pub fn new(map_count: usize, reduce_count: usize) -> Result<Self> {
        if reduce_count == 0 {
            return Err(MrError::InvalidConfig(
                "reduce bucket count must be at least 1".to_string(),
            ));
        }
        let (sender, receiver) = async_channel::unbounded();
        Ok(Self {
            map_count,
            reduce_count,
            sender,
            receiver,
            progress: Mutex::new(Progress {
                map_done: vec![false; map_count],
                reduce_done: vec![false; reduce_count],
                ..Progress::default()
            }),
        })
    }

    pub fn map_count(&self) -> usize {
        self.map_count
    }

    pub fn reduce_count(&self) -> usize {
        self.reduce_count
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        // every mutation below completes before it can panic
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues one map task per input. Must be called once, before workers start.
    pub fn enqueue_map_tasks<S: AsRef<str>>(&self, inputs: &[S]) -> Result<()> {
        let mut progress = self.lock();
        if progress.maps_enqueued {
            return Err(MrError::ProtocolViolation(
                "map tasks already enqueued".to_string(),
            ));
        }
        if inputs.len() != self.map_count {
            return Err(MrError::ProtocolViolation(format!(
                "expected {} inputs, got {}",
                self.map_count,
                inputs.len()
            )));
        }
        progress.maps_enqueued = true;

        for (id, input) in inputs.iter().enumerate() {
            self.send(Task::Map {
                id,
                input: input.as_ref().to_string(),
                reduce_count: self.reduce_count,
            })?;
        }
        info!("Enqueued {} map tasks", self.map_count);

        if self.map_count == 0 {
            self.enqueue_reduce_tasks(&mut progress)?;
        }
        Ok(())
    }

    // called with the progress lock held
    fn enqueue_reduce_tasks(&self, progress: &mut Progress) -> Result<()> {
        if progress.reduce_enqueued || progress.completed != self.map_count {
            return Err(MrError::ProtocolViolation(format!(
                "reduce tasks requested with {}/{} map tasks completed",
                progress.completed, self.map_count
            )));
        }
        progress.reduce_enqueued = true;
        for id in 0..self.reduce_count {
            self.send(Task::Reduce { id })?;
        }
        info!("All map tasks completed, enqueued {} reduce tasks", self.reduce_count);
        Ok(())
    }

    fn send(&self, task: Task) -> Result<()> {
        self.sender
            .try_send(task)
            .map_err(|e| MrError::ProtocolViolation(format!("task queue closed: {}", e)))
    }

    /// Takes a pending task if there is one. Never blocks.
    pub fn claim_task(&self) -> Option<Task> {
        match self.receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Blocks until a task is available. Returns `None` once the run is done,
    /// cancelled, or can no longer finish because a task was abandoned.
    pub fn next_task(&self) -> Option<Task> {
        self.receiver.recv_blocking().ok()
    }

    /// Async variant of [`Coordinator::next_task`].
    pub async fn next_task_async(&self) -> Option<Task> {
        self.receiver.recv().await.ok()
    }

    /// Records that `task` finished. The M-th map completion enqueues the
    /// reduce tasks within the same critical section.
    pub fn report_completion(&self, task: &Task) -> Result<()> {
        let mut progress = self.lock();

        let id = task.id();
        let done = match task {
            Task::Map { .. } => progress.map_done.get_mut(id),
            Task::Reduce { .. } => {
                if !progress.reduce_enqueued {
                    return Err(MrError::ProtocolViolation(format!(
                        "{} completed before the map phase finished",
                        task
                    )));
                }
                progress.reduce_done.get_mut(id)
            }
        };
        match done {
            None => {
                return Err(MrError::ProtocolViolation(format!("unknown task {}", task)));
            }
            Some(true) => {
                return Err(MrError::ProtocolViolation(format!(
                    "{} reported twice",
                    task
                )));
            }
            Some(flag) => *flag = true,
        }

        progress.completed += 1;
        debug!(
            "{} completed ({}/{})",
            task,
            progress.completed,
            self.total_tasks()
        );

        if progress.completed == self.map_count {
            // closed by cancel or abandon, the reduce phase never starts
            if self.sender.is_closed() {
                debug!("Task queue closed, not enqueueing reduce tasks");
            } else {
                self.enqueue_reduce_tasks(&mut progress)?;
            }
        }
        if progress.completed == self.total_tasks() {
            info!("All map and reduce tasks completed");
            self.sender.close();
        }
        Ok(())
    }

    /// Gives up on a failed task. It is not re-queued, so the run can no longer
    /// complete: the queue is closed and waiters leave once it is drained.
    pub fn abandon(&self, task: &Task) {
        let mut progress = self.lock();
        warn!("Abandoning {}", task);
        progress.abandoned.push(task.clone());
        self.sender.close();
    }

    /// Stops the run. Pending tasks are discarded, tasks in flight still finish.
    pub fn cancel(&self) {
        let _progress = self.lock();
        self.sender.close();
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        warn!("Run cancelled, discarded {} pending tasks", discarded);
    }

    pub fn abandoned_tasks(&self) -> Vec<Task> {
        self.lock().abandoned.clone()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed
    }

    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    pub fn all_tasks_completed(&self) -> bool {
        self.lock().completed == self.total_tasks()
    }

    pub fn phase(&self) -> Phase {
        let completed = self.lock().completed;
        if completed == self.total_tasks() {
            Phase::Done
        } else if completed >= self.map_count {
            Phase::Reduce
        } else {
            Phase::Map
        }
    }

    fn total_tasks(&self) -> usize {
        self.map_count + self.reduce_count
    }
}
