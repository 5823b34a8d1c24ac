use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::error::LaunchError;
use super::job::JobSpec;
use super::run_id::RunIdentifier;

/// A job that has been started and let go.
///
/// There is no completion callback and no way to cancel: the dispatcher only ever
/// observes the job again through the process table. A job that hangs keeps its
/// slot for as long as it hangs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedJob {
    pub run_id: RunIdentifier,
    pub pid: Option<u32>,
    pub log_path: PathBuf,
}

/// Starts the analysis for a job inside its run directory without waiting for it
pub trait JobLauncher {
    fn launch(&mut self, job: &JobSpec, run_dir: &Path) -> Result<DetachedJob, LaunchError>;

    /// Collect the exit status of finished jobs so they do not linger as zombies.
    /// Returns how many were collected.
    fn reap(&mut self) -> usize {
        0
    }
}

/// Spawns the analysis executable as a real child process.
///
/// Relative executable paths are resolved from the run directory, which is also
/// the child's working directory. Child handles are kept only so finished jobs can
/// be reaped; their exit status is not reported anywhere.
#[derive(Debug, Default)]
pub struct ProcessLauncher {
    children: Vec<Child>,
}

impl JobLauncher for ProcessLauncher {
    fn launch(&mut self, job: &JobSpec, run_dir: &Path) -> Result<DetachedJob, LaunchError> {
        let log_path = run_dir.join(job.log_file_name());
        let stdout =
            File::create(&log_path).map_err(|e| LaunchError::LogFile(log_path.clone(), e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| LaunchError::LogFile(log_path.clone(), e))?;

        let executable = if job.executable.is_relative() {
            run_dir.join(&job.executable)
        } else {
            job.executable.clone()
        };

        let child = Command::new(&executable)
            .args(job.arguments())
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| LaunchError::Spawn(executable.clone(), e))?;

        let pid = child.id();
        self.children.push(child);
        Ok(DetachedJob {
            run_id: job.run_id.clone(),
            pid: Some(pid),
            log_path,
        })
    }

    fn reap(&mut self) -> usize {
        let before = self.children.len();
        // A child whose status cannot be read is dropped as well; dropping never kills it
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        before - self.children.len()
    }
}

/// Prints what would be launched and starts nothing
#[derive(Debug, Default)]
pub struct DryRunLauncher {
    pub launched: Vec<String>,
}

impl JobLauncher for DryRunLauncher {
    fn launch(&mut self, job: &JobSpec, run_dir: &Path) -> Result<DetachedJob, LaunchError> {
        let line = job.command_line();
        log::info!("[dry run] in {}: {}", run_dir.to_string_lossy(), line);
        self.launched.push(line);
        Ok(DetachedJob {
            run_id: job.run_id.clone(),
            pid: None,
            log_path: run_dir.join(job.log_file_name()),
        })
    }
}
