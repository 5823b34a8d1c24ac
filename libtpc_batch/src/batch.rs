use std::sync::mpsc::Sender;

use super::config::{BatchSpec, Config};
use super::dispatch_status::{DispatchPhase, DispatchStatus};
use super::dispatcher::{DispatchPolicy, DispatchSummary, Dispatcher};
use super::error::{BatchError, DispatchError};
use super::finalize::{CampaignReport, CommandRunner, Finalizer};
use super::grouper::{RunGrouper, RunMap};
use super::job::{build_jobs, JobSpec};
use super::launcher::JobLauncher;
use super::process_table::ProcessTable;
use super::workspace::RunWorkspace;

/// Group the raw files of one batch directory into runs
pub fn group_batch(config: &Config, batch: &BatchSpec) -> Result<RunMap, BatchError> {
    let grouper = RunGrouper::new(config.split_chunks);
    let run_map = grouper.group(&batch.data_path, &config.file_patterns)?;
    if run_map.is_empty() {
        log::warn!("No runs found in {}", batch.data_path.to_string_lossy());
    }
    if !run_map.unmatched().is_empty() {
        log::warn!(
            "{} file(s) in {} carry no run timestamp and were skipped",
            run_map.unmatched().len(),
            batch.data_path.to_string_lossy()
        );
    }
    Ok(run_map)
}

/// Group every batch and build the job queue, in config order
pub fn build_job_queue(config: &Config) -> Result<Vec<JobSpec>, BatchError> {
    let mut queue = Vec::new();
    for batch in config.batches.iter() {
        log::info!("Grouping runs in {}...", batch.data_path.to_string_lossy());
        let run_map = group_batch(config, batch)?;
        log::info!("Found {} run(s).", run_map.len());
        queue.extend(build_jobs(config, run_map, &batch.geometry_path));
    }
    Ok(queue)
}

/// Run the finalize step of the config, if there is one
pub fn finalize<R: CommandRunner>(config: &Config, runner: R) -> Vec<CampaignReport> {
    match &config.finalize {
        Some(finalize_config) => {
            let top_path = config.get_top_directory();
            let mut finalizer =
                Finalizer::new(finalize_config, &config.work_path, &top_path, runner);
            finalizer.finalize()
        }
        None => {
            log::info!("No finalize step configured.");
            vec![]
        }
    }
}

/// The main loop of the batch.
///
/// Groups every batch directory, launches one job per run while respecting the
/// concurrency limit, optionally waits for all jobs to finish and then finalizes.
pub fn run_batch<P: ProcessTable, L: JobLauncher, R: CommandRunner>(
    config: &Config,
    table: P,
    launcher: L,
    runner: R,
    tx: &Sender<DispatchStatus>,
) -> Result<DispatchSummary, BatchError> {
    config.validate()?;
    tx.send(DispatchStatus::new(DispatchPhase::Grouping, 0, 0, 0, ""))
        .map_err(DispatchError::from)?;
    let queue = build_job_queue(config)?;

    let workspace = RunWorkspace::new(&config.work_path, &config.resource_patterns);
    let policy = DispatchPolicy::from_config(config)?;
    let mut dispatcher = Dispatcher::new(table, launcher, workspace, policy);

    let summary = dispatcher.dispatch(&queue, tx)?;
    log::info!(
        "Launched {} of {} job(s).",
        summary.launched.len(),
        queue.len()
    );
    if !summary.failed.is_empty() {
        log::warn!(
            "{} job(s) could not be launched; check the .out files in their run directories",
            summary.failed.len()
        );
    }

    if config.wait_for_completion {
        dispatcher.drain(tx)?;
        for report in finalize(config, runner) {
            if let Some(e) = report.error {
                log::error!("Campaign {} was not finalized: {e}", report.name);
            }
        }
    } else if config.has_finalize() {
        log::warn!("Not waiting for jobs to finish, so finalize is skipped.");
    }

    tx.send(DispatchStatus::new(
        DispatchPhase::Finished,
        summary.launched.len(),
        queue.len(),
        0,
        "",
    ))
    .map_err(DispatchError::from)?;
    Ok(summary)
}
