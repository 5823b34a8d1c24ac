use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use super::error::WorkspaceError;
use super::run_id::RunIdentifier;
use super::wildcard::wildcard_match;

/// Link a resource of the work directory into a run directory one level below it.
/// The link is relative, so a dangling resource is linked just the same.
#[cfg(target_family = "unix")]
fn link_resource(_work_dir: &Path, name: &OsStr, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(Path::new("..").join(name), dst)
}

/// Windows symlinks need privileges, so resources are copied there
#[cfg(target_family = "windows")]
fn link_resource(work_dir: &Path, name: &OsStr, dst: &Path) -> std::io::Result<()> {
    let src = work_dir.join(name);
    if src.is_dir() {
        copy_directory(&src, dst)
    } else {
        std::fs::copy(&src, dst).map(|_| ())
    }
}

/// Recursively copy a directory tree. Symlinks inside it are followed.
pub fn copy_directory(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for item in src.read_dir()? {
        let item = item?;
        let target = dst.join(item.file_name());
        if item.path().is_dir() {
            copy_directory(&item.path(), &target)?;
        } else {
            std::fs::copy(item.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a directory, copying it when a rename is not possible (e.g. across filesystems)
pub fn move_directory(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!(
                "Could not rename {} ({e}), copying instead",
                src.to_string_lossy()
            );
            copy_then_remove(src, dst)
        }
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Err(e) = copy_directory(src, dst) {
        // Leave the source untouched and do not keep a partial copy
        let _ = std::fs::remove_dir_all(dst);
        return Err(e);
    }
    std::fs::remove_dir_all(src)
}

/// RunWorkspace is the working directory holding one subdirectory per run.
///
/// Run directories are created on first dispatch and are never removed; they keep
/// the job log and whatever the job writes.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
    resource_patterns: Vec<String>,
}

impl RunWorkspace {
    pub fn new(root: &Path, resource_patterns: &[String]) -> Self {
        Self {
            root: root.to_path_buf(),
            resource_patterns: resource_patterns.to_vec(),
        }
    }

    pub fn run_directory(&self, run_id: &RunIdentifier) -> PathBuf {
        self.root.join(run_id.directory_name())
    }

    /// Create the run directory if needed and link the shared resources into it.
    ///
    /// Calling this again for the same run is a no-op. A resource which cannot be
    /// linked is logged and skipped.
    pub fn prepare(&self, run_id: &RunIdentifier) -> Result<PathBuf, WorkspaceError> {
        let run_dir = self.run_directory(run_id);
        if !run_dir.is_dir() {
            std::fs::create_dir_all(&run_dir)
                .map_err(|e| WorkspaceError::CreateDirectory(run_dir.clone(), e))?;
            log::info!("Created run directory {}", run_dir.to_string_lossy());
        }

        for name in self.find_resources()? {
            let dst = run_dir.join(&name);
            // symlink_metadata so a dangling link still counts as present
            if dst.symlink_metadata().is_ok() {
                continue;
            }
            if let Err(e) = link_resource(&self.root, &name, &dst) {
                let error = WorkspaceError::LinkResource(self.root.join(&name), e);
                log::warn!("{error}, skipping it");
            }
        }
        Ok(run_dir)
    }

    /// Names of the work directory entries matching any resource pattern, dangling
    /// links included
    fn find_resources(&self) -> Result<Vec<OsString>, WorkspaceError> {
        if self.resource_patterns.is_empty() || !self.root.is_dir() {
            return Ok(vec![]);
        }
        let mut resources = Vec::new();
        for item in self.root.read_dir()? {
            let name = item?.file_name();
            let name_str = name.to_string_lossy();
            if self
                .resource_patterns
                .iter()
                .any(|pattern| wildcard_match(pattern, &name_str))
            {
                resources.push(name);
            }
        }
        resources.sort();
        Ok(resources)
    }
}
