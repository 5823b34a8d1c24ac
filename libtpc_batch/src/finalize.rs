use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::config::{CampaignSpec, FinalizeConfig};
use super::constants::{REVISION_FILE_NAME, UNKNOWN_REVISION};
use super::error::FinalizeError;
use super::wildcard::wildcard_match;
use super::workspace::move_directory;

/// Runs the external tools used by finalize (merge utility, plotter, git)
pub trait CommandRunner {
    /// Run a program to completion, failing on a non-zero exit
    fn run(&mut self, program: &str, args: &[OsString], cwd: &Path) -> Result<(), FinalizeError>;
    /// Run a program and return its trimmed stdout
    fn capture(
        &mut self,
        program: &str,
        args: &[OsString],
        cwd: &Path,
    ) -> Result<String, FinalizeError>;
}

#[derive(Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&mut self, program: &str, args: &[OsString], cwd: &Path) -> Result<(), FinalizeError> {
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .map_err(|e| FinalizeError::ToolSpawn(program.to_string(), e))?;
        if status.success() {
            Ok(())
        } else {
            Err(FinalizeError::ToolFailed(
                program.to_string(),
                status.to_string(),
            ))
        }
    }

    fn capture(
        &mut self,
        program: &str,
        args: &[OsString],
        cwd: &Path,
    ) -> Result<String, FinalizeError> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| FinalizeError::ToolSpawn(program.to_string(), e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(FinalizeError::ToolFailed(
                program.to_string(),
                output.status.to_string(),
            ))
        }
    }
}

/// What happened to one campaign
#[derive(Debug, Default)]
pub struct CampaignReport {
    pub name: String,
    pub collected: Vec<String>,
    pub missing: Vec<String>,
    pub aggregate: Option<PathBuf>,
    pub plotted: bool,
    pub error: Option<FinalizeError>,
}

/// Finalize collects the run directories of each campaign under the top directory,
/// merges their results into one aggregate, plots it and records the source revision.
pub struct Finalizer<'a, R: CommandRunner> {
    config: &'a FinalizeConfig,
    work_path: PathBuf,
    top_path: PathBuf,
    runner: R,
}

impl<'a, R: CommandRunner> Finalizer<'a, R> {
    pub fn new(config: &'a FinalizeConfig, work_path: &Path, top_path: &Path, runner: R) -> Self {
        Self {
            config,
            work_path: work_path.to_path_buf(),
            top_path: top_path.to_path_buf(),
            runner,
        }
    }

    /// Finalize every campaign. A failing campaign does not stop the others.
    pub fn finalize(&mut self) -> Vec<CampaignReport> {
        let config = self.config;
        let mut reports = Vec::new();
        for campaign in config.campaigns.iter() {
            log::info!("Finalizing campaign {}...", campaign.name);
            let mut report = CampaignReport {
                name: campaign.name.clone(),
                ..Default::default()
            };
            if let Err(e) = self.finalize_campaign(campaign, &mut report) {
                log::error!("Campaign {} failed: {e}", campaign.name);
                report.error = Some(e);
            }
            reports.push(report);
        }
        reports
    }

    fn finalize_campaign(
        &mut self,
        campaign: &CampaignSpec,
        report: &mut CampaignReport,
    ) -> Result<(), FinalizeError> {
        let campaign_dir = self.top_path.join(&campaign.name);
        if !campaign_dir.exists() {
            std::fs::create_dir_all(&campaign_dir)?;
        }

        for run in self.campaign_runs(campaign)? {
            let src = self.work_path.join(&run);
            let dst = campaign_dir.join(&run);
            if dst.exists() {
                report.collected.push(run);
            } else if src.is_dir() {
                move_directory(&src, &dst)
                    .map_err(|e| FinalizeError::MoveRun(src.clone(), dst.clone(), e))?;
                report.collected.push(run);
            } else {
                log::info!(
                    "Run {run} not found in {}, skipping",
                    self.work_path.to_string_lossy()
                );
                report.missing.push(run);
            }
        }

        self.record_revision(&campaign_dir)?;

        let results = self.find_results(&campaign_dir)?;
        if results.is_empty() {
            log::warn!(
                "No {} files to merge for campaign {}",
                self.config.result_pattern,
                campaign.name
            );
            return Ok(());
        }

        let aggregate = campaign_dir.join(campaign.aggregate_name());
        let mut args: Vec<OsString> = self.config.merge_args.iter().map(OsString::from).collect();
        args.push(aggregate.clone().into());
        args.extend(results.into_iter().map(OsString::from));
        self.runner
            .run(&self.config.merge_program, &args, &campaign_dir)?;
        log::info!("Merged campaign {} into {}", campaign.name, aggregate.to_string_lossy());
        report.aggregate = Some(aggregate.clone());

        if let Some(plot) = &self.config.plot {
            let script_name = plot.script.file_name().map(PathBuf::from).unwrap_or_default();
            let script_copy = campaign_dir.join(&script_name);
            std::fs::copy(&plot.script, &script_copy)?;
            let mut args: Vec<OsString> = plot.args.iter().map(OsString::from).collect();
            args.push(script_copy.into());
            args.push(aggregate.into());
            self.runner.run(&plot.program, &args, &campaign_dir)?;
            report.plotted = true;
        }
        Ok(())
    }

    /// Listed runs first, then any prefix matches not already listed
    fn campaign_runs(&self, campaign: &CampaignSpec) -> Result<Vec<String>, FinalizeError> {
        let mut runs = campaign.runs.clone();
        if let Some(prefix) = &campaign.run_prefix {
            let mut found = Vec::new();
            if self.work_path.is_dir() {
                for item in self.work_path.read_dir()? {
                    let item_path = item?.path();
                    if !item_path.is_dir() {
                        continue;
                    }
                    let name = item_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if name.starts_with(prefix.as_str()) && !runs.contains(&name) {
                        found.push(name);
                    }
                }
            }
            found.sort();
            runs.extend(found);
        }
        Ok(runs)
    }

    /// Result files one level down, `<campaign>/<run>/<result_pattern>`
    fn find_results(&self, campaign_dir: &Path) -> Result<Vec<PathBuf>, FinalizeError> {
        let mut results = Vec::new();
        for run_item in campaign_dir.read_dir()? {
            let run_path = run_item?.path();
            if !run_path.is_dir() {
                continue;
            }
            for item in run_path.read_dir()? {
                let item_path = item?.path();
                let matches = item_path
                    .file_name()
                    .map(|n| wildcard_match(&self.config.result_pattern, &n.to_string_lossy()))
                    .unwrap_or(false);
                if matches && item_path.is_file() {
                    results.push(item_path);
                }
            }
        }
        results.sort();
        Ok(results)
    }

    /// Write the git revision of the analysis sources next to the outputs
    fn record_revision(&mut self, campaign_dir: &Path) -> Result<(), FinalizeError> {
        let repo = self
            .config
            .revision_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let args: Vec<OsString> = vec!["rev-parse".into(), "HEAD".into()];
        let revision = match self.runner.capture("git", &args, &repo) {
            Ok(rev) if !rev.is_empty() => rev,
            Ok(_) | Err(_) => {
                log::warn!(
                    "Could not read the git revision of {}",
                    repo.to_string_lossy()
                );
                String::from(UNKNOWN_REVISION)
            }
        };
        std::fs::write(campaign_dir.join(REVISION_FILE_NAME), format!("{revision}\n"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotSpec;

    /// Records every call instead of running anything
    #[derive(Default)]
    struct RecordingRunner {
        calls: Vec<(String, Vec<String>)>,
        fail_program: Option<String>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(
            &mut self,
            program: &str,
            args: &[OsString],
            _cwd: &Path,
        ) -> Result<(), FinalizeError> {
            self.calls.push((
                program.to_string(),
                args.iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            ));
            if self.fail_program.as_deref() == Some(program) {
                return Err(FinalizeError::ToolFailed(
                    program.to_string(),
                    String::from("exit status: 1"),
                ));
            }
            Ok(())
        }

        fn capture(
            &mut self,
            _program: &str,
            _args: &[OsString],
            _cwd: &Path,
        ) -> Result<String, FinalizeError> {
            Ok(String::from("3f2c1b0"))
        }
    }

    fn make_run(work: &Path, run: &str) {
        let run_dir = work.join(run);
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join(format!("TrackTree_{run}.root")), "tree").unwrap();
        std::fs::write(run_dir.join(format!("{run}.out")), "log").unwrap();
    }

    fn finalize_config(
        plot_script: Option<PathBuf>,
        campaigns: Vec<CampaignSpec>,
    ) -> FinalizeConfig {
        FinalizeConfig {
            plot: plot_script.map(|script| PlotSpec {
                program: String::from("root"),
                args: vec![String::from("-b"), String::from("-q")],
                script,
            }),
            campaigns,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_run_is_skipped() {
        let work = tempfile::tempdir().unwrap();
        let top = tempfile::tempdir().unwrap();
        make_run(work.path(), "2021-06-16T17-46-28.582");
        make_run(work.path(), "2021-06-23T14-16-30.884");
        let script = work.path().join("plotTracks.C");
        std::fs::write(&script, "void plotTracks(){}").unwrap();

        let config = finalize_config(
            Some(script),
            vec![CampaignSpec {
                name: String::from("IFJ_VdG"),
                aggregate: None,
                runs: vec![
                    String::from("2021-06-16T17-46-28.582"),
                    String::from("2021-06-22T12-01-56.568"),
                    String::from("2021-06-23T14-16-30.884"),
                ],
                run_prefix: None,
            }],
        );
        let mut finalizer =
            Finalizer::new(&config, work.path(), top.path(), RecordingRunner::default());
        let reports = finalizer.finalize();

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.error.is_none());
        assert_eq!(report.missing, vec!["2021-06-22T12-01-56.568"]);
        assert_eq!(report.collected.len(), 2);
        assert!(report.plotted);

        let campaign_dir = top.path().join("IFJ_VdG");
        assert!(campaign_dir.join("2021-06-16T17-46-28.582").is_dir());
        assert!(!work.path().join("2021-06-16T17-46-28.582").exists());
        assert!(campaign_dir.join("plotTracks.C").exists());
        assert_eq!(
            std::fs::read_to_string(campaign_dir.join(REVISION_FILE_NAME)).unwrap(),
            "3f2c1b0\n"
        );

        let calls = &finalizer.runner.calls;
        assert_eq!(calls.len(), 2);
        let (merge_program, merge_args) = &calls[0];
        assert_eq!(merge_program, "hadd");
        assert_eq!(merge_args[0], "-f");
        assert!(merge_args[1].ends_with("IFJ_VdG.root"));
        // Only the two .root results, not the job logs
        assert_eq!(merge_args.len(), 4);
        assert_eq!(calls[1].0, "root");
    }

    #[test]
    fn test_prefix_and_failure_isolation() {
        let work = tempfile::tempdir().unwrap();
        make_run(work.path(), "2018-06-19T10-15-49.145");
        make_run(work.path(), "2018-06-19T11-02-11.003");
        make_run(work.path(), "2022-04-12T15-28-17.188");

        let config = FinalizeConfig {
            merge_program: String::from("broken_hadd"),
            ..finalize_config(
                None,
                vec![
                    CampaignSpec {
                        name: String::from("2018"),
                        aggregate: Some(String::from("2018.root")),
                        runs: vec![],
                        run_prefix: Some(String::from("2018-")),
                    },
                    CampaignSpec {
                        name: String::from("HIgS_2022"),
                        aggregate: None,
                        runs: vec![String::from("2022-04-12T15-28-17.188")],
                        run_prefix: None,
                    },
                ],
            )
        };
        let runner = RecordingRunner {
            calls: vec![],
            fail_program: Some(String::from("broken_hadd")),
        };
        let mut finalizer = Finalizer::new(&config, work.path(), work.path(), runner);
        let reports = finalizer.finalize();

        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].collected,
            vec!["2018-06-19T10-15-49.145", "2018-06-19T11-02-11.003"]
        );
        assert!(reports[0].error.is_some());
        // The second campaign still ran
        assert_eq!(reports[1].collected, vec!["2022-04-12T15-28-17.188"]);
        assert_eq!(finalizer.runner.calls.len(), 2);
        assert!(work.path().join("2018").join(REVISION_FILE_NAME).exists());
    }

    #[test]
    fn test_nothing_to_merge() {
        let work = tempfile::tempdir().unwrap();
        let config = finalize_config(
            None,
            vec![CampaignSpec {
                name: String::from("calibration_12.5MHz"),
                aggregate: None,
                runs: vec![String::from("2021-11-25T13-53-16.129")],
                run_prefix: None,
            }],
        );
        let mut finalizer =
            Finalizer::new(&config, work.path(), work.path(), RecordingRunner::default());
        let reports = finalizer.finalize();
        assert!(reports[0].error.is_none());
        assert!(reports[0].aggregate.is_none());
        assert!(finalizer.runner.calls.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_top_directory_on_another_filesystem() {
        let work = tempfile::tempdir().unwrap();
        // /dev/shm is usually a separate tmpfs; skip where it is missing
        let Ok(top) = tempfile::tempdir_in("/dev/shm") else {
            return;
        };
        make_run(work.path(), "2021-06-16T17-46-28.582");
        let config = finalize_config(
            None,
            vec![CampaignSpec {
                name: String::from("IFJ_VdG"),
                aggregate: None,
                runs: vec![String::from("2021-06-16T17-46-28.582")],
                run_prefix: None,
            }],
        );
        let mut finalizer =
            Finalizer::new(&config, work.path(), top.path(), RecordingRunner::default());
        let reports = finalizer.finalize();
        assert!(reports[0].error.is_none());
        assert_eq!(reports[0].collected, vec!["2021-06-16T17-46-28.582"]);
        let moved = top.path().join("IFJ_VdG").join("2021-06-16T17-46-28.582");
        assert!(moved.join("TrackTree_2021-06-16T17-46-28.582.root").is_file());
        assert!(!work.path().join("2021-06-16T17-46-28.582").exists());
    }

    #[test]
    fn test_rerun_keeps_collected_runs() {
        let work = tempfile::tempdir().unwrap();
        let top = tempfile::tempdir().unwrap();
        make_run(work.path(), "2021-11-25T14-07-04.200");
        let config = finalize_config(
            None,
            vec![CampaignSpec {
                name: String::from("calibration_25MHz"),
                aggregate: None,
                runs: vec![String::from("2021-11-25T14-07-04.200")],
                run_prefix: None,
            }],
        );
        let mut first =
            Finalizer::new(&config, work.path(), top.path(), RecordingRunner::default());
        first.finalize();
        let mut second =
            Finalizer::new(&config, work.path(), top.path(), RecordingRunner::default());
        let reports = second.finalize();
        assert_eq!(reports[0].collected, vec!["2021-11-25T14-07-04.200"]);
        assert!(reports[0].missing.is_empty());
        assert_eq!(second.runner.calls.len(), 1);
    }
}
