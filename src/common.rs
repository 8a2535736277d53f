use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// {key: reduce_output}
pub type Output = BTreeMap<String, String>;

/// Unit of intermediate data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Map,
    Reduce,
}

/// A unit of work handed out by the coordinator.
///
/// Map ids run over `0..M` and reduce ids over `0..R`, so an id alone does not
/// identify a task across phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Map {
        id: usize,
        // input reference, a path for file storage
        input: String,
        reduce_count: usize,
    },
    Reduce {
        id: usize,
    },
}

impl Task {
    pub fn id(&self) -> usize {
        match self {
            Task::Map { id, .. } | Task::Reduce { id } => *id,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Map { .. } => TaskKind::Map,
            Task::Reduce { .. } => TaskKind::Reduce,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Task::Map { .. })
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Map { id, input, .. } => write!(f, "map#{} ({})", id, input),
            Task::Reduce { id } => write!(f, "reduce#{}", id),
        }
    }
}

pub trait MapReduceApp: Send + Sync {
    fn map(&self, filename: &str, contents: &str) -> Vec<KeyValue>;
    fn reduce(&self, key: &str, values: &[String]) -> anyhow::Result<String>;
}

#[async_trait]
pub trait MapReduce {
    async fn run(self) -> anyhow::Result<Output>;
}
