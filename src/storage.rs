//! Storage collaborator: raw inputs, intermediate buckets and the result sink.
//!
//! Intermediate data and results are line oriented, one `key value` pair per
//! line separated by a single space. Intermediate keys and values, and result
//! keys, must be non-empty and free of whitespace. Every backend rejects
//! anything else with `MrError::Unencodable`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::common::KeyValue;
use crate::error::{MrError, Result};

pub const RESULT_FILE_NAME: &str = "result.txt";

pub fn intermediate_name(map_id: usize, bucket: usize) -> String {
    format!("mr-{}-{}.txt", map_id, bucket)
}

pub trait Storage: Send + Sync {
    fn read_input(&self, input: &str) -> Result<String>;

    /// Replaces whatever was stored at `(map_id, bucket)` with `pairs`.
    fn write_intermediate(&self, map_id: usize, bucket: usize, pairs: &[KeyValue]) -> Result<()>;

    fn read_intermediate(&self, map_id: usize, bucket: usize) -> Result<Vec<KeyValue>>;

    /// Appends one record to the shared result sink.
    fn write_result(&self, key: &str, result: &str) -> Result<()>;

    /// Empties the result sink. Called once per run before any worker starts.
    fn clear_results(&self) -> Result<()>;

    fn read_results(&self) -> Result<Vec<KeyValue>>;
}

fn is_field(text: &str) -> bool {
    !text.is_empty() && !text.contains(char::is_whitespace)
}

fn check_pairs(location: &str, pairs: &[KeyValue]) -> Result<()> {
    match pairs.iter().find(|kv| !is_field(&kv.key) || !is_field(&kv.value)) {
        Some(kv) => Err(MrError::Unencodable {
            location: location.to_string(),
            record: kv.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_result_key(location: &str, key: &str) -> Result<()> {
    if is_field(key) {
        Ok(())
    } else {
        Err(MrError::Unencodable {
            location: location.to_string(),
            record: key.to_string(),
        })
    }
}

fn encode_lines(pairs: &[KeyValue]) -> String {
    pairs.iter().fold(String::new(), |mut acc, kv| {
        acc.push_str(&format!("{}\n", kv));
        acc
    })
}

/// Parses `key value` lines. Lines without exactly two fields are skipped.
fn parse_lines(location: &str, contents: &str) -> Vec<KeyValue> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(key), Some(value), None) => Some(KeyValue::new(key, value)),
                _ => {
                    warn!("Invalid line format in {}: {:?}", location, line);
                    None
                }
            }
        })
        .collect()
}

/// Result lines hold a key and a free-form result, split at the first space.
fn parse_results(contents: &str) -> Vec<KeyValue> {
    contents
        .lines()
        .filter_map(|line| line.split_once(' '))
        .map(|(key, result)| KeyValue::new(key, result))
        .collect()
}

pub struct FileStorage {
    work_dir: PathBuf,
    // serializes appends to the result sink
    result_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)
            .map_err(|e| MrError::write(work_dir.display().to_string(), e))?;
        Ok(Self {
            work_dir,
            result_lock: Mutex::new(()),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn intermediate_path(&self, map_id: usize, bucket: usize) -> PathBuf {
        self.work_dir.join(intermediate_name(map_id, bucket))
    }

    pub fn result_path(&self) -> PathBuf {
        self.work_dir.join(RESULT_FILE_NAME)
    }

    fn lock_results(&self) -> std::sync::MutexGuard<'_, ()> {
        // the guarded data is (), a poisoned lock carries no broken state
        self.result_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for FileStorage {
    fn read_input(&self, input: &str) -> Result<String> {
        debug!("Reading input: {}", input);
        fs::read_to_string(input).map_err(|e| MrError::read(input, e))
    }

    fn write_intermediate(&self, map_id: usize, bucket: usize, pairs: &[KeyValue]) -> Result<()> {
        let path = self.intermediate_path(map_id, bucket);
        check_pairs(&path.display().to_string(), pairs)?;
        fs::write(&path, encode_lines(pairs))
            .map_err(|e| MrError::write(path.display().to_string(), e))?;
        debug!("Wrote {} pairs to {}", pairs.len(), path.display());
        Ok(())
    }

    fn read_intermediate(&self, map_id: usize, bucket: usize) -> Result<Vec<KeyValue>> {
        let path = self.intermediate_path(map_id, bucket);
        let location = path.display().to_string();
        let contents = fs::read_to_string(&path).map_err(|e| MrError::read(&location, e))?;
        Ok(parse_lines(&location, &contents))
    }

    fn write_result(&self, key: &str, result: &str) -> Result<()> {
        let path = self.result_path();
        let location = path.display().to_string();
        check_result_key(&location, key)?;
        let _guard = self.lock_results();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MrError::write(&location, e))?;
        file.write_all(format!("{} {}\n", key, result).as_bytes())
            .map_err(|e| MrError::write(&location, e))
    }

    fn clear_results(&self) -> Result<()> {
        let path = self.result_path();
        let _guard = self.lock_results();
        fs::write(&path, "").map_err(|e| MrError::write(path.display().to_string(), e))
    }

    fn read_results(&self) -> Result<Vec<KeyValue>> {
        let path = self.result_path();
        let location = path.display().to_string();
        let _guard = self.lock_results();
        let contents = fs::read_to_string(&path).map_err(|e| MrError::read(&location, e))?;
        Ok(parse_results(&contents))
    }
}

#[derive(Default)]
struct MemoryState {
    inputs: HashMap<String, String>,
    intermediate: HashMap<(usize, usize), Vec<KeyValue>>,
    results: Vec<KeyValue>,
}

/// Keeps everything in process memory. Inputs are registered up front.
///
/// Pairs are stored as given rather than encoded, but they are checked against
/// the line format so a job behaves the same on either backend.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I, K, V>(inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let storage = Self::new();
        for (name, contents) in inputs {
            storage.add_input(name, contents);
        }
        storage
    }

    pub fn add_input(&self, name: impl Into<String>, contents: impl Into<String>) {
        self.lock().inputs.insert(name.into(), contents.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read_input(&self, input: &str) -> Result<String> {
        self.lock()
            .inputs
            .get(input)
            .cloned()
            .ok_or_else(|| MrError::NotFound {
                location: input.to_string(),
            })
    }

    fn write_intermediate(&self, map_id: usize, bucket: usize, pairs: &[KeyValue]) -> Result<()> {
        check_pairs(&intermediate_name(map_id, bucket), pairs)?;
        self.lock()
            .intermediate
            .insert((map_id, bucket), pairs.to_vec());
        Ok(())
    }

    fn read_intermediate(&self, map_id: usize, bucket: usize) -> Result<Vec<KeyValue>> {
        self.lock()
            .intermediate
            .get(&(map_id, bucket))
            .cloned()
            .ok_or_else(|| MrError::NotFound {
                location: intermediate_name(map_id, bucket),
            })
    }

    fn write_result(&self, key: &str, result: &str) -> Result<()> {
        check_result_key(RESULT_FILE_NAME, key)?;
        self.lock().results.push(KeyValue::new(key, result));
        Ok(())
    }

    fn clear_results(&self) -> Result<()> {
        self.lock().results.clear();
        Ok(())
    }

    fn read_results(&self) -> Result<Vec<KeyValue>> {
        Ok(self.lock().results.clone())
    }
}
