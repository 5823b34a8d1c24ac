use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::config::Config;
use super::constants::JOB_LOG_EXTENSION;
use super::grouper::{RunFileSet, RunMap};
use super::run_id::RunIdentifier;

/// Run conditions encoded in a geometry file name,
/// e.g. `geometry_ELITPC_250mbar_12.5MHz.dat` -> 250 mbar, 12.5 MHz
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryConditions {
    pub pressure: Option<String>,
    pub sampling_rate: Option<String>,
}

impl GeometryConditions {
    pub fn from_path(geometry_path: &Path) -> Self {
        let stem = geometry_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut conditions = Self::default();
        for token in stem.split('_') {
            if let Some(value) = token.strip_suffix("mbar") {
                if !value.is_empty() {
                    conditions.pressure = Some(value.to_string());
                }
            } else if let Some(value) = token.strip_suffix("MHz") {
                if !value.is_empty() {
                    conditions.sampling_rate = Some(value.to_string());
                }
            }
        }
        conditions
    }
}

/// Everything needed to launch the analysis for one run
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub run_id: RunIdentifier,
    pub executable: PathBuf,
    pub geometry_path: PathBuf,
    pub files: RunFileSet,
    pub conditions: GeometryConditions,
    pub extra_args: Vec<String>,
}

impl JobSpec {
    pub fn new(
        run_id: RunIdentifier,
        executable: &Path,
        geometry_path: &Path,
        files: RunFileSet,
    ) -> Self {
        Self {
            run_id,
            executable: executable.to_path_buf(),
            geometry_path: geometry_path.to_path_buf(),
            conditions: GeometryConditions::from_path(geometry_path),
            files,
            extra_args: vec![],
        }
    }

    pub fn with_extra_args(mut self, extra_args: &[String]) -> Self {
        self.extra_args = extra_args.to_vec();
        self
    }

    /// Command line arguments, without the executable itself
    pub fn arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--input.geometryFile".into(),
            self.geometry_path.clone().into(),
            "--input.dataFile".into(),
            self.files.to_csv().into(),
        ];
        if let Some(pressure) = &self.conditions.pressure {
            args.push("--conditions.pressure".into());
            args.push(pressure.into());
        }
        if let Some(rate) = &self.conditions.sampling_rate {
            args.push("--conditions.samplingRate".into());
            args.push(rate.into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Printable command line for the operator
    pub fn command_line(&self) -> String {
        let mut line = self.executable.to_string_lossy().into_owned();
        for arg in self.arguments() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Name of the file receiving the job's stdout and stderr
    pub fn log_file_name(&self) -> String {
        format!("{}.{}", self.run_id, JOB_LOG_EXTENSION)
    }
}

/// Turn a grouped data directory into the jobs for it, in discovery order
pub fn build_jobs(config: &Config, run_map: RunMap, geometry_path: &Path) -> Vec<JobSpec> {
    run_map
        .into_iter()
        .map(|(run_id, files)| {
            JobSpec::new(run_id, &config.executable, geometry_path, files)
                .with_extra_args(&config.extra_args)
        })
        .collect()
}
