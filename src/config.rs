//! Command line configuration for the `mr-engine` binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use crate::common::MapReduceApp;
use crate::error::{MrError, Result};
use crate::map_reduce_apps::{Indexer, WordCount};
use crate::mr_parallel::{ClaimMode, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppName {
    /// Word count
    Wc,
    /// Inverted index of words to input files
    Indexer,
}

impl AppName {
    pub fn build(self) -> Arc<dyn MapReduceApp> {
        match self {
            AppName::Wc => Arc::new(WordCount {}),
            AppName::Indexer => Arc::new(Indexer {}),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Run a map-reduce job over local files")]
pub struct Cli {
    /// Input files, one map task each
    #[arg(required = true)]
    pub input_files: Vec<PathBuf>,

    /// Number of reduce buckets
    #[arg(short, long, default_value_t = 2)]
    pub reduce_count: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 2)]
    pub workers: usize,

    /// Directory for intermediate files and result.txt
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = AppName::Wc)]
    pub app: AppName,

    #[arg(long, value_enum, default_value_t = ClaimMode::Wait)]
    pub claim_mode: ClaimMode,

    /// Run map and reduce in a single thread instead
    #[arg(long)]
    pub sequential: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn validate(&self) -> Result<()> {
        if self.reduce_count == 0 {
            return Err(MrError::InvalidConfig(
                "--reduce-count must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(MrError::InvalidConfig(
                "--workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn inputs(&self) -> Vec<String> {
        self.input_files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            reduce_count: self.reduce_count,
            workers: self.workers,
            claim_mode: self.claim_mode,
        }
    }

    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mr-engine", "file1.txt", "file2.txt"]).unwrap();
        assert_eq!(cli.reduce_count, 2);
        assert_eq!(cli.workers, 2);
        assert_eq!(cli.app, AppName::Wc);
        assert_eq!(cli.claim_mode, ClaimMode::Wait);
        assert!(!cli.sequential);
        assert_eq!(cli.inputs(), vec!["file1.txt", "file2.txt"]);
        assert_eq!(cli.log_level(), "info");
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "mr-engine",
            "-r",
            "5",
            "-w",
            "3",
            "--app",
            "indexer",
            "--claim-mode",
            "poll",
            "-vv",
            "in.txt",
        ])
        .unwrap();
        let options = cli.run_options();
        assert_eq!(options.reduce_count, 5);
        assert_eq!(options.workers, 3);
        assert_eq!(options.claim_mode, ClaimMode::Poll);
        assert_eq!(cli.app, AppName::Indexer);
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn test_inputs_required() {
        assert!(Cli::try_parse_from(["mr-engine"]).is_err());
    }

    #[test]
    fn test_zero_counts_rejected() {
        let cli = Cli::try_parse_from(["mr-engine", "-r", "0", "in.txt"]).unwrap();
        assert!(matches!(cli.validate(), Err(MrError::InvalidConfig(_))));

        let cli = Cli::try_parse_from(["mr-engine", "-w", "0", "in.txt"]).unwrap();
        assert!(matches!(cli.validate(), Err(MrError::InvalidConfig(_))));
    }
}
