//! # tpc_batch_cli
//!
//! Part of the tpc_batch crate family.
//!
//! Command line front end which groups raw TPC data into runs, launches the analysis
//! for each run in the background, and finalizes the results.
//!
//! ## Use
//!
//! ```bash
//! tpc_batch_cli -p batch.yml new        # write a template configuration
//! tpc_batch_cli -p batch.yml group      # show how the data is grouped into runs
//! tpc_batch_cli -p batch.yml            # run the whole batch (same as `run`)
//! tpc_batch_cli -p batch.yml --dry-run  # print the job command lines only
//! tpc_batch_cli -p batch.yml finalize   # only merge and plot finished runs
//! ```
use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use simplelog::{CombinedLogger, SharedLogger, WriteLogger};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libtpc_batch::batch::{build_job_queue, finalize, run_batch};
use libtpc_batch::config::Config;
use libtpc_batch::dispatch_status::{DispatchPhase, DispatchStatus};
use libtpc_batch::dispatcher::DispatchSummary;
use libtpc_batch::error::BatchError;
use libtpc_batch::finalize::SystemCommandRunner;
use libtpc_batch::launcher::{DryRunLauncher, ProcessLauncher};
use libtpc_batch::process_table::SystemProcessTable;

const LOG_FILE_NAME: &str = "tpc_batch.log";

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Print the grouping of every batch directory without launching anything
fn show_grouping(config: &Config) {
    match build_job_queue(config) {
        Ok(queue) => {
            for job in queue.iter() {
                log::info!("{} ({} file(s))", job.run_id, job.files.len());
                for file in job.files.files() {
                    log::info!("\t{}", file.to_string_lossy());
                }
            }
            log::info!("{} run(s) in total.", queue.len());
        }
        Err(e) => log::error!("{e}"),
    }
}

fn run_finalize(config: &Config) {
    let reports = finalize(config, SystemCommandRunner);
    for report in reports {
        match report.error {
            Some(e) => log::error!("Campaign {} failed: {e}", report.name),
            None => log::info!(
                "Campaign {}: {} run(s) collected, {} missing.",
                report.name,
                report.collected.len(),
                report.missing.len()
            ),
        }
    }
}

fn update_bar(pb: &ProgressBar, status: &DispatchStatus) {
    pb.set_length(status.total.max(1) as u64);
    pb.set_position(status.launched as u64);
    let message = match status.phase {
        DispatchPhase::Grouping => String::from("grouping runs"),
        DispatchPhase::Waiting => format!("waiting for a slot for {}", status.run_id),
        DispatchPhase::Launched => format!("launched {}", status.run_id),
        DispatchPhase::Draining => String::from("waiting for jobs to finish"),
        DispatchPhase::Finished => String::from("done"),
    };
    pb.set_message(message);
}

fn main() {
    // Create a cli
    let matches = Command::new("tpc_batch_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(Command::new("group").about("Show how the data is grouped into runs"))
        .subcommand(Command::new("run").about("Launch the batch and finalize (default)"))
        .subcommand(Command::new("finalize").about("Only merge and plot finished runs"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the job command lines instead of launching them"),
        )
        .get_matches();

    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("A configuration path is required");
            return;
        }
    };

    // Initialize feedback
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];
    match File::create(LOG_FILE_NAME) {
        Ok(file) => loggers.push(WriteLogger::new(
            simplelog::LevelFilter::Debug,
            simplelog::Config::default(),
            file,
        )),
        Err(e) => eprintln!("Could not create log file {LOG_FILE_NAME}: {e}"),
    }

    let pb_manager = MultiProgress::new();
    let logger = CombinedLogger::new(loggers);
    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    log::set_max_level(log::LevelFilter::Debug);

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Work Path: {}", config.work_path.to_string_lossy());
    log::info!("Executable: {}", config.executable.to_string_lossy());
    log::info!("Max Concurrent Jobs: {}", config.max_concurrent);
    for batch in config.batches.iter() {
        log::info!(
            "Batch: {} (geometry {})",
            batch.data_path.to_string_lossy(),
            batch.geometry_path.to_string_lossy()
        );
    }

    match matches.subcommand() {
        Some(("group", _)) => {
            show_grouping(&config);
            return;
        }
        Some(("finalize", _)) => {
            run_finalize(&config);
            log::info!("Done.");
            return;
        }
        _ => (),
    }

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(1));
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} jobs {msg}")
    {
        pb.set_style(style);
    }

    let dry_run = matches.get_flag("dry-run");
    let (tx, rx) = mpsc::channel::<DispatchStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || -> Result<DispatchSummary, BatchError> {
        if dry_run {
            // Nothing was launched, so there is nothing to wait for or finalize
            let config = Config {
                wait_for_completion: false,
                ..config
            };
            run_batch(
                &config,
                SystemProcessTable::new(),
                DryRunLauncher::default(),
                SystemCommandRunner,
                &tx,
            )
        } else {
            run_batch(
                &config,
                SystemProcessTable::new(),
                ProcessLauncher::default(),
                SystemCommandRunner,
                &tx,
            )
        }
    });

    loop {
        // No UI here, so sleep ~1 sec between progress updates
        std::thread::sleep(std::time::Duration::from_secs(1));
        for status in rx.try_iter() {
            update_bar(&pb, &status);
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(summary) => log::info!(
                        "Batch complete: {} job(s) launched, {} failed to launch.",
                        summary.launched.len(),
                        summary.failed.len()
                    ),
                    Err(e) => log::error!("Batch failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join batch task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}
