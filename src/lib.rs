//! A single-process map-reduce engine: a coordinator hands map and reduce tasks
//! to a pool of workers that exchange intermediate data through storage.

pub mod common;
pub mod config;
pub mod error;
pub mod logging;
pub mod map_reduce_apps;
pub mod map_reduce_seq;
pub mod mr_parallel;
pub mod partition;
pub mod storage;

pub use common::{KeyValue, MapReduce, MapReduceApp, Output, Task, TaskKind};
pub use error::{MrError, Result};
