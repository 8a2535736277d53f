use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use tracing::info;

use crate::common::{KeyValue, MapReduce, MapReduceApp, Output};
use crate::error::MrError;
use crate::storage::Storage;

/// Single-threaded reference run: map everything, sort, group, reduce.
pub struct SequentialMapReduce {
    inputs: Vec<String>,
    mr_app: Arc<dyn MapReduceApp>,
    storage: Arc<dyn Storage>,
}

impl SequentialMapReduce {
    pub fn new(
        inputs: Vec<String>,
        mr_app: Arc<dyn MapReduceApp>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            inputs,
            mr_app,
            storage,
        }
    }

    pub fn run_sync(self) -> anyhow::Result<Output> {
        let mut intermediate: Vec<KeyValue> = Vec::new();
        for input in &self.inputs {
            let contents = self.storage.read_input(input)?;
            intermediate.extend(self.mr_app.map(input, &contents));
        }
        intermediate.sort_by(|a, b| a.key.cmp(&b.key));

        self.storage.clear_results()?;
        let mut output = Output::new();
        for (key, group) in &intermediate.into_iter().chunk_by(|kv| kv.key.clone()) {
            let values: Vec<String> = group.map(|kv| kv.value).collect();
            let reduced = self
                .mr_app
                .reduce(&key, &values)
                .map_err(|source| MrError::Application {
                    key: key.clone(),
                    source,
                })?;
            self.storage.write_result(&key, &reduced)?;
            output.insert(key, reduced);
        }

        info!("Sequential run produced {} keys", output.len());
        Ok(output)
    }
}

#[async_trait]
impl MapReduce for SequentialMapReduce {
    async fn run(self) -> anyhow::Result<Output> {
        tokio::task::spawn_blocking(move || self.run_sync()).await?
    }
}
