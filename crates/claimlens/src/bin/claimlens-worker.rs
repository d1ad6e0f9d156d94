//! Long-lived worker process: claims queued jobs one at a time and runs
//! them through the pipeline.
//!
//! Usage: `claimlens-worker [config-path]` (default `claimlens.json`).

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use claimlens::{
    load_config, Collaborators, Database, IsolatedCall, JobQueue, QueryPipeline, Worker,
    WorkspaceLayout,
};

fn main() -> ExitCode {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "claimlens.json".to_string());

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<(), claimlens::ClaimlensError> {
    let config = load_config(config_path)?;

    let layout = WorkspaceLayout::new(&config.workspace_root);
    layout.ensure().map_err(|e| {
        claimlens::ClaimlensError::Config(claimlens::ConfigError::Validation {
            message: format!("cannot create workspace tree: {}", e),
        })
    })?;

    let db = Database::open(&layout.db_path)?;
    let queue = JobQueue::open(&layout.system_dir)?;

    let collaborators = Collaborators::from_config(&config.collaborators)?;
    let isolate = IsolatedCall::new(
        config.search.timeout(),
        config.search.max_attempts,
        config.search.retry_delay(),
    );

    let pipeline = QueryPipeline::new(db, layout, collaborators, isolate);
    let worker = Worker::new(queue, pipeline, config.worker.sleep_interval());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received interrupt, shutting down...");
        flag.store(true, Ordering::Relaxed);
    }) {
        log::warn!("Could not install signal handler: {}", e);
    }

    worker.run(&shutdown)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_log::LogTracer::init();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
