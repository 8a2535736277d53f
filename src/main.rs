use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use mr_engine::config::Cli;
use mr_engine::logging::init_logging;
use mr_engine::map_reduce_seq::SequentialMapReduce;
use mr_engine::mr_parallel::ParallelMapReduce;
use mr_engine::storage::FileStorage;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level(), cli.verbose);
    cli.validate()?;

    let storage = Arc::new(FileStorage::new(&cli.work_dir)?);
    let app = cli.app.build();

    if cli.sequential {
        let output = SequentialMapReduce::new(cli.inputs(), app, storage.clone())
            .run_sync()?;
        info!(
            "Wrote {} results to {}",
            output.len(),
            storage.result_path().display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let job = ParallelMapReduce::new(cli.inputs(), app, storage.clone(), cli.run_options());
    let outcome = job
        .execute_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                // no signal handler, never cancel
                std::future::pending::<()>().await;
            }
            warn!("Interrupted, cancelling run");
        })
        .await?;

    for failure in &outcome.failures {
        error!("{}", failure);
    }
    if outcome.all_completed {
        info!("Results written to {}", storage.result_path().display());
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
