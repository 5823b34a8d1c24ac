use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::constants::{
    DEFAULT_FILE_PATTERNS, DEFAULT_LAUNCH_SETTLE_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_RESOURCE_PATTERNS,
};
use super::error::ConfigError;

/// One directory of raw data together with the geometry it was taken with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSpec {
    pub data_path: PathBuf,
    pub geometry_path: PathBuf,
}

/// External plotting step run on each campaign aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlotSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub script: PathBuf,
}

/// A named group of runs which are merged together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignSpec {
    pub name: String,
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub runs: Vec<String>,
    /// Collect every run directory starting with this prefix as well
    #[serde(default)]
    pub run_prefix: Option<String>,
}

impl CampaignSpec {
    /// File name of the merged result, `<name>.root` unless set
    pub fn aggregate_name(&self) -> String {
        self.aggregate
            .clone()
            .unwrap_or_else(|| format!("{}.root", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalizeConfig {
    #[serde(default)]
    pub top_path: Option<PathBuf>,
    pub merge_program: String,
    #[serde(default)]
    pub merge_args: Vec<String>,
    pub result_pattern: String,
    #[serde(default)]
    pub plot: Option<PlotSpec>,
    #[serde(default)]
    pub revision_path: Option<PathBuf>,
    #[serde(default)]
    pub campaigns: Vec<CampaignSpec>,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            top_path: None,
            merge_program: String::from("hadd"),
            merge_args: vec![String::from("-f")],
            result_pattern: String::from("*.root"),
            plot: None,
            revision_path: None,
            campaigns: vec![],
        }
    }
}

/// Structure representing the batch configuration. Contains pathing, job and campaign information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub work_path: PathBuf,
    pub executable: PathBuf,
    #[serde(default)]
    pub process_name: Option<String>,
    pub max_concurrent: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_launch_settle")]
    pub launch_settle_secs: u64,
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,
    #[serde(default = "default_resource_patterns")]
    pub resource_patterns: Vec<String>,
    #[serde(default)]
    pub split_chunks: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_true")]
    pub wait_for_completion: bool,
    #[serde(default)]
    pub batches: Vec<BatchSpec>,
    #[serde(default)]
    pub finalize: Option<FinalizeConfig>,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_launch_settle() -> u64 {
    DEFAULT_LAUNCH_SETTLE_SECS
}

fn default_file_patterns() -> Vec<String> {
    DEFAULT_FILE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_resource_patterns() -> Vec<String> {
    DEFAULT_RESOURCE_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    /// Generate a new Config object. Paths will be placeholders
    fn default() -> Self {
        Self {
            work_path: PathBuf::from("None"),
            executable: PathBuf::from("../../bin/makeTrackTree"),
            process_name: None,
            max_concurrent: 1,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            launch_settle_secs: DEFAULT_LAUNCH_SETTLE_SECS,
            file_patterns: default_file_patterns(),
            resource_patterns: default_resource_patterns(),
            split_chunks: false,
            extra_args: vec![],
            wait_for_completion: true,
            batches: vec![BatchSpec {
                data_path: PathBuf::from("None"),
                geometry_path: PathBuf::from("None"),
            }],
            finalize: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as YAML
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent < 1 {
            return Err(ConfigError::BadConcurrency(self.max_concurrent));
        }
        if self.file_patterns.is_empty() {
            return Err(ConfigError::NoFilePatterns);
        }
        self.tracked_process_name()?;
        Ok(())
    }

    /// The name counted in the process table; the executable's file name unless overridden
    pub fn tracked_process_name(&self) -> Result<String, ConfigError> {
        if let Some(name) = &self.process_name {
            return Ok(name.clone());
        }
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ConfigError::NoProcessName(self.executable.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_secs(self.launch_settle_secs)
    }

    /// Directory the campaign aggregates are written under
    pub fn get_top_directory(&self) -> PathBuf {
        self.finalize
            .as_ref()
            .and_then(|f| f.top_path.clone())
            .unwrap_or_else(|| self.work_path.clone())
    }

    pub fn has_finalize(&self) -> bool {
        self.finalize.is_some()
    }
}
