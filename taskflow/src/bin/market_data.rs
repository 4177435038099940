//! Runs the market-data ingestion pipeline once.
//!
//! Configuration comes from `TASKFLOW_*` environment variables; log
//! verbosity from `RUST_LOG`.

use std::process::ExitCode;

use taskflow::config::PipelineConfig;
use taskflow::etl::market_data_pipeline;
use taskflow::observability::init_tracing;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("{e}");
    }

    let pipeline = match market_data_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Could not assemble pipeline");
            return ExitCode::from(2);
        }
    };

    match pipeline.run().await.into_result() {
        Ok(ctx) => {
            info!(run_id = %ctx.run_id(), entries = ctx.task_entry_count(), "Ingestion finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(run_id = %e.context.run_id(), failed_task = %e.failed_task(), "{e}");
            ExitCode::FAILURE
        }
    }
}
