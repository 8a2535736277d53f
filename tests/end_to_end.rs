use std::fs;
use std::path::Path;
use std::sync::Arc;

use mr_engine::map_reduce_apps::{Indexer, WordCount};
use mr_engine::map_reduce_seq::SequentialMapReduce;
use mr_engine::mr_parallel::{ClaimMode, ParallelMapReduce, RunOptions};
use mr_engine::storage::{FileStorage, Storage};
use mr_engine::{MapReduce, MapReduceApp, Output};
use tempfile::TempDir;

fn write_inputs(dir: &Path, contents: &[&str]) -> Vec<String> {
    contents
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.join(format!("file{}.txt", i + 1));
            fs::write(&path, text).unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect()
}

fn output_of(pairs: &[(&str, &str)]) -> Output {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_word_count_over_files() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = write_inputs(temp_dir.path(), &["a b", "b c", "c a"]);
    let storage = Arc::new(FileStorage::new(temp_dir.path().join("work")).unwrap());
    let options = RunOptions {
        reduce_count: 2,
        workers: 2,
        claim_mode: ClaimMode::Wait,
    };

    let output = ParallelMapReduce::new(inputs, Arc::new(WordCount {}), storage.clone(), options)
        .run()
        .await
        .unwrap();

    assert_eq!(output, output_of(&[("a", "2"), ("b", "2"), ("c", "2")]));

    // every (map, bucket) pair has its own intermediate file
    for map_id in 0..3 {
        for bucket in 0..2 {
            assert!(storage.intermediate_path(map_id, bucket).exists());
        }
    }
    let result = fs::read_to_string(storage.result_path()).unwrap();
    assert_eq!(result.lines().count(), 3);
}

#[tokio::test]
async fn test_parallel_matches_sequential() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = write_inputs(
        temp_dir.path(),
        &[
            "the quick brown fox jumps over the lazy dog",
            "the dog barks\nthe fox runs",
            "",
            "lazy lazy lazy quick",
            "over and over and over",
        ],
    );

    let apps: Vec<Arc<dyn MapReduceApp>> = vec![Arc::new(WordCount {}), Arc::new(Indexer {})];
    for app in apps {
        let seq_storage = Arc::new(FileStorage::new(temp_dir.path().join("seq")).unwrap());
        let expected = SequentialMapReduce::new(inputs.clone(), app.clone(), seq_storage)
            .run()
            .await
            .unwrap();

        for (reduce_count, workers) in [(1, 1), (3, 2), (7, 5)] {
            let storage = Arc::new(
                FileStorage::new(temp_dir.path().join(format!("par-{reduce_count}-{workers}")))
                    .unwrap(),
            );
            let options = RunOptions {
                reduce_count,
                workers,
                claim_mode: ClaimMode::Wait,
            };
            let output = ParallelMapReduce::new(inputs.clone(), app.clone(), storage, options)
                .run()
                .await
                .unwrap();
            assert_eq!(output, expected);
        }
    }
}

#[tokio::test]
async fn test_values_from_every_map_task_reach_reducer() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = write_inputs(temp_dir.path(), &["x", "x x"]);
    let storage = Arc::new(FileStorage::new(temp_dir.path()).unwrap());
    let options = RunOptions {
        reduce_count: 1,
        workers: 2,
        claim_mode: ClaimMode::Wait,
    };

    let output = ParallelMapReduce::new(inputs, Arc::new(WordCount {}), storage, options)
        .run()
        .await
        .unwrap();

    assert_eq!(output, output_of(&[("x", "3")]));
}

#[tokio::test]
async fn test_stale_results_are_cleared() {
    let temp_dir = TempDir::new().unwrap();
    let inputs = write_inputs(temp_dir.path(), &["fresh"]);
    let storage = Arc::new(FileStorage::new(temp_dir.path()).unwrap());
    storage.write_result("stale", "99").unwrap();

    let output = ParallelMapReduce::new(
        inputs,
        Arc::new(WordCount {}),
        storage,
        RunOptions::default(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(output, output_of(&[("fresh", "1")]));
}

#[tokio::test]
async fn test_missing_input_leaves_run_incomplete() {
    let temp_dir = TempDir::new().unwrap();
    let mut inputs = write_inputs(temp_dir.path(), &["a b"]);
    inputs.push(temp_dir.path().join("missing.txt").to_string_lossy().into_owned());
    let storage = Arc::new(FileStorage::new(temp_dir.path()).unwrap());

    let outcome = ParallelMapReduce::new(
        inputs,
        Arc::new(WordCount {}),
        storage,
        RunOptions::default(),
    )
    .execute()
    .await
    .unwrap();

    assert!(!outcome.all_completed);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.completed_tasks < 2);
}

#[tokio::test]
async fn test_indexer_handles_whitespace_in_input_paths() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("my doc.txt");
    fs::write(&input, "hello world").unwrap();
    let inputs = vec![input.to_string_lossy().into_owned()];
    let escaped = input.to_string_lossy().replace(' ', "%20");

    let seq_storage = Arc::new(FileStorage::new(temp_dir.path().join("seq")).unwrap());
    let expected = SequentialMapReduce::new(inputs.clone(), Arc::new(Indexer {}), seq_storage)
        .run()
        .await
        .unwrap();
    let storage = Arc::new(FileStorage::new(temp_dir.path().join("par")).unwrap());
    let output = ParallelMapReduce::new(inputs, Arc::new(Indexer {}), storage, RunOptions::default())
        .run()
        .await
        .unwrap();

    let hit = format!("1 {}", escaped);
    assert_eq!(
        output,
        output_of(&[("hello", hit.as_str()), ("world", hit.as_str())])
    );
    assert_eq!(output, expected);
}
