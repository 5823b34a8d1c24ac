use std::sync::mpsc::Sender;
use std::time::Duration;

use super::config::Config;
use super::dispatch_status::{DispatchPhase, DispatchStatus};
use super::error::{ConfigError, DispatchError};
use super::job::JobSpec;
use super::launcher::{DetachedJob, JobLauncher};
use super::process_table::ProcessTable;
use super::run_id::RunIdentifier;
use super::workspace::RunWorkspace;

/// How the dispatcher throttles launches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub process_name: String,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub launch_settle: Duration,
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            process_name: config.tracked_process_name()?,
            max_concurrent: config.max_concurrent as usize,
            poll_interval: config.poll_interval(),
            launch_settle: config.launch_settle(),
        })
    }
}

/// A launch, with the live job count seen right before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub job: DetachedJob,
    pub observed_live: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub launched: Vec<LaunchRecord>,
    pub failed: Vec<RunIdentifier>,
}

/// Dispatcher launches one detached job per run, never starting a new one while
/// `max_concurrent` or more instances of the tracked executable are running.
///
/// The limit is advisory: it is checked by polling the process table, so two
/// dispatchers running side by side can overshoot it together.
pub struct Dispatcher<P: ProcessTable, L: JobLauncher> {
    table: P,
    launcher: L,
    workspace: RunWorkspace,
    policy: DispatchPolicy,
}

impl<P: ProcessTable, L: JobLauncher> Dispatcher<P, L> {
    pub fn new(table: P, launcher: L, workspace: RunWorkspace, policy: DispatchPolicy) -> Self {
        Self {
            table,
            launcher,
            workspace,
            policy,
        }
    }

    /// Block until fewer than `limit` tracked processes are alive.
    ///
    /// Finished children are reaped before every poll. Returns the last count seen.
    pub fn wait_until_below(&mut self, limit: usize) -> usize {
        self.launcher.reap();
        let mut live = self
            .table
            .count_matching_processes(&self.policy.process_name);
        while live >= limit {
            log::info!(
                "Number of jobs running: {} Waiting {} s.",
                live,
                self.policy.poll_interval.as_secs()
            );
            std::thread::sleep(self.policy.poll_interval);
            self.launcher.reap();
            live = self
                .table
                .count_matching_processes(&self.policy.process_name);
        }
        live
    }

    /// Launch every job in order, throttled by the policy.
    ///
    /// A job whose run directory cannot be prepared or which fails to start is logged
    /// and left behind; it is not retried.
    pub fn dispatch(
        &mut self,
        jobs: &[JobSpec],
        tx: &Sender<DispatchStatus>,
    ) -> Result<DispatchSummary, DispatchError> {
        let mut summary = DispatchSummary::default();
        let total = jobs.len();

        for job in jobs {
            let run_str = job.run_id.to_string();
            tx.send(DispatchStatus::new(
                DispatchPhase::Waiting,
                summary.launched.len(),
                total,
                0,
                &run_str,
            ))?;
            let live = self.wait_until_below(self.policy.max_concurrent);

            let run_dir = match self.workspace.prepare(&job.run_id) {
                Ok(dir) => dir,
                Err(e) => {
                    log::error!("Job {run_str} has no usable run directory: {e}");
                    summary.failed.push(job.run_id.clone());
                    continue;
                }
            };
            log::info!(
                "Running job id: {}\nfor file(s):\n\t{}",
                run_str,
                job.files
                    .files()
                    .iter()
                    .map(|f| f.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("\n\t")
            );
            log::info!(
                "Run size: {}",
                human_bytes::human_bytes(job.files.total_size_bytes() as f64)
            );

            match self.launcher.launch(job, &run_dir) {
                Ok(detached) => {
                    log::info!("{}", job.command_line());
                    summary.launched.push(LaunchRecord {
                        job: detached,
                        observed_live: live,
                    });
                    tx.send(DispatchStatus::new(
                        DispatchPhase::Launched,
                        summary.launched.len(),
                        total,
                        live + 1,
                        &run_str,
                    ))?;
                    // Give the child time to show up in the process table before the next poll
                    std::thread::sleep(self.policy.launch_settle);
                }
                Err(e) => {
                    log::error!("Job {run_str} could not be launched: {e}");
                    summary.failed.push(job.run_id.clone());
                }
            }
        }
        Ok(summary)
    }

    /// Wait until no tracked process is left running
    pub fn drain(&mut self, tx: &Sender<DispatchStatus>) -> Result<(), DispatchError> {
        tx.send(DispatchStatus::new(DispatchPhase::Draining, 0, 0, 0, ""))?;
        self.wait_until_below(1);
        log::info!("All {} jobs have finished.", self.policy.process_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LaunchError;
    use crate::grouper::RunFileSet;
    use crate::process_table::ScriptedProcessTable;
    use std::path::Path;
    use std::sync::mpsc;

    /// Launcher that records the order it was called in
    #[derive(Default)]
    struct RecordingLauncher {
        order: Vec<String>,
        fail_on: Option<String>,
        reaps: usize,
    }

    impl JobLauncher for RecordingLauncher {
        fn launch(&mut self, job: &JobSpec, run_dir: &Path) -> Result<DetachedJob, LaunchError> {
            if self.fail_on.as_deref() == Some(job.run_id.to_string().as_str()) {
                return Err(LaunchError::Spawn(
                    job.executable.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                ));
            }
            self.order.push(job.run_id.to_string());
            Ok(DetachedJob {
                run_id: job.run_id.clone(),
                pid: None,
                log_path: run_dir.join(job.log_file_name()),
            })
        }

        fn reap(&mut self) -> usize {
            self.reaps += 1;
            0
        }
    }

    fn jobs(timestamps: &[&str]) -> Vec<JobSpec> {
        timestamps
            .iter()
            .map(|ts| {
                JobSpec::new(
                    RunIdentifier::new(ts),
                    Path::new("../../bin/makeTrackTree"),
                    Path::new("geometry_ELITPC_250mbar_12.5MHz.dat"),
                    RunFileSet::default(),
                )
            })
            .collect()
    }

    fn policy(max_concurrent: usize) -> DispatchPolicy {
        DispatchPolicy {
            process_name: String::from("makeTrackTree"),
            max_concurrent,
            poll_interval: Duration::ZERO,
            launch_settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_third_job_waits_for_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        // job1 sees 0, job2 sees 1, job3 sees 2 three times and then 1 once job1 is done
        let table = ScriptedProcessTable::new([0, 1, 2, 2, 2, 1]);
        let mut dispatcher = Dispatcher::new(
            table,
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(2),
        );
        let (tx, _rx) = mpsc::channel();
        let queued = jobs(&[
            "2021-06-16T17-46-28.582",
            "2021-06-22T12-01-56.568",
            "2021-06-23T14-16-30.884",
        ]);
        let summary = dispatcher.dispatch(&queued, &tx).unwrap();

        assert_eq!(
            dispatcher.launcher.order,
            vec![
                "2021-06-16T17-46-28.582",
                "2021-06-22T12-01-56.568",
                "2021-06-23T14-16-30.884",
            ]
        );
        assert_eq!(dispatcher.table.queries(), &[0, 1, 2, 2, 2, 1]);
        let observed: Vec<usize> = summary.launched.iter().map(|l| l.observed_live).collect();
        assert_eq!(observed, vec![0, 1, 1]);
        assert!(summary.launched.iter().all(|l| l.observed_live < 2));
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn test_launch_never_sees_full_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = ScriptedProcessTable::new([3, 4, 2, 0, 3, 3, 1, 2, 2, 0]);
        let mut dispatcher = Dispatcher::new(
            table,
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(2),
        );
        let (tx, _rx) = mpsc::channel();
        let queued = jobs(&[
            "2021-11-25T13-53-16.129",
            "2021-11-25T15-00-32.273",
            "2021-11-25T15-21-05.094",
        ]);
        let summary = dispatcher.dispatch(&queued, &tx).unwrap();
        assert_eq!(summary.launched.len(), 3);
        assert!(summary.launched.iter().all(|l| l.observed_live < 2));
    }

    #[test]
    fn test_spawn_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher {
            fail_on: Some(String::from("2021-06-22T12-01-56.568")),
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([0]),
            launcher,
            RunWorkspace::new(dir.path(), &[]),
            policy(1),
        );
        let (tx, _rx) = mpsc::channel();
        let queued = jobs(&[
            "2021-06-16T17-46-28.582",
            "2021-06-22T12-01-56.568",
            "2021-06-23T14-16-30.884",
        ]);
        let summary = dispatcher.dispatch(&queued, &tx).unwrap();
        assert_eq!(summary.launched.len(), 2);
        assert_eq!(
            summary.failed,
            vec![RunIdentifier::new("2021-06-22T12-01-56.568")]
        );
        // One poll per job, none extra for the failure
        assert_eq!(dispatcher.table.queries().len(), 3);
        // The run directory is still created for the failed run
        assert!(dir.path().join("2021-06-22T12-01-56.568").is_dir());
    }

    #[test]
    fn test_every_poll_reaps_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([3, 3, 1]),
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(2),
        );
        assert_eq!(dispatcher.wait_until_below(2), 1);
        assert_eq!(dispatcher.launcher.reaps, 3);
    }

    #[cfg(target_family = "unix")]
    #[test]
    fn test_dangling_resource_does_not_stop_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("moved_away.dat"),
            dir.path().join("old_geometry.dat"),
        )
        .unwrap();
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([0]),
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[String::from("*.dat")]),
            policy(2),
        );
        let (tx, _rx) = mpsc::channel();
        let queued = jobs(&["2021-06-16T17-46-28.582", "2021-06-22T12-01-56.568"]);
        let summary = dispatcher.dispatch(&queued, &tx).unwrap();
        assert_eq!(summary.launched.len(), 2);
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn test_unusable_run_directory_is_a_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the first run directory should go
        std::fs::write(dir.path().join("2021-06-16T17-46-28.582"), "not a directory").unwrap();
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([0]),
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(2),
        );
        let (tx, _rx) = mpsc::channel();
        let queued = jobs(&["2021-06-16T17-46-28.582", "2021-06-22T12-01-56.568"]);
        let summary = dispatcher.dispatch(&queued, &tx).unwrap();
        assert_eq!(
            summary.failed,
            vec![RunIdentifier::new("2021-06-16T17-46-28.582")]
        );
        assert_eq!(dispatcher.launcher.order, vec!["2021-06-22T12-01-56.568"]);
    }

    #[test]
    fn test_drain_waits_for_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([2, 1, 1, 0]),
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(2),
        );
        let (tx, rx) = mpsc::channel();
        dispatcher.drain(&tx).unwrap();
        assert_eq!(dispatcher.table.queries(), &[2, 1, 1, 0]);
        assert_eq!(rx.recv().unwrap().phase, DispatchPhase::Draining);
    }

    #[test]
    fn test_status_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(
            ScriptedProcessTable::new([0]),
            RecordingLauncher::default(),
            RunWorkspace::new(dir.path(), &[]),
            policy(4),
        );
        let (tx, rx) = mpsc::channel();
        dispatcher
            .dispatch(&jobs(&["2022-04-12T15-28-17.188"]), &tx)
            .unwrap();
        let statuses: Vec<DispatchStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].phase, DispatchPhase::Waiting);
        assert_eq!(statuses[1].phase, DispatchPhase::Launched);
        assert_eq!(statuses[1].launched, statuses[1].total);
    }
}
