use std::path::PathBuf;
use thiserror::Error;

use super::dispatch_status::DispatchStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config requested {0} concurrent jobs; at least 1 is required")]
    BadConcurrency(u32),
    #[error("Config does not list any raw file patterns")]
    NoFilePatterns,
    #[error("Config executable {0:?} has no file name to track in the process table")]
    NoProcessName(PathBuf),
}

#[derive(Debug, Error)]
pub enum GrouperError {
    #[error("RunGrouper could not read data directory {0:?}: {1}")]
    BadDirectory(PathBuf, std::io::Error),
    #[error("RunGrouper failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Could not create run directory {0:?}: {1}")]
    CreateDirectory(PathBuf, std::io::Error),
    #[error("Could not link resource {0:?} into run directory: {1}")]
    LinkResource(PathBuf, std::io::Error),
    #[error("Workspace failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Could not create log file {0:?}: {1}")]
    LogFile(PathBuf, std::io::Error),
    #[error("Could not spawn {0:?}: {1}")]
    Spawn(PathBuf, std::io::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<DispatchStatus>),
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Finalize failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Finalize could not run {0}: {1}")]
    ToolSpawn(String, std::io::Error),
    #[error("Finalize tool {0} exited with status {1}")]
    ToolFailed(String, String),
    #[error("Finalize could not move run directory {0:?} to {1:?}: {2}")]
    MoveRun(PathBuf, PathBuf, std::io::Error),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Batch failed due to RunGrouper error: {0}")]
    GrouperError(#[from] GrouperError),
    #[error("Batch failed due to Dispatcher error: {0}")]
    DispatchError(#[from] DispatchError),
}
