use std::path::{Path, PathBuf};

use fxhash::FxHashMap;

use super::error::GrouperError;
use super::run_id::{
    default_strategies, extract_file_tag, ExtractionStrategy, FileTag, RunIdentifier,
};
use super::wildcard::wildcard_match;

/// The raw files of one run, in the order the analysis expects them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFileSet {
    files: Vec<PathBuf>,
}

impl RunFileSet {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Comma joined list, as passed on the analysis command line
    pub fn to_csv(&self) -> String {
        self.files
            .iter()
            .map(|f| f.to_string_lossy())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Sum of the sizes of the files that can be stat-ed
    pub fn total_size_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| f.metadata().ok())
            .fold(0, |sum, meta| sum + meta.len())
    }
}

/// Mapping of RunIdentifier to RunFileSet which remembers discovery order.
#[derive(Debug, Clone, Default)]
pub struct RunMap {
    runs: Vec<(RunIdentifier, RunFileSet)>,
    index: FxHashMap<RunIdentifier, usize>,
    unmatched: Vec<PathBuf>,
}

impl RunMap {
    pub fn get(&self, id: &RunIdentifier) -> Option<&RunFileSet> {
        self.index.get(id).map(|idx| &self.runs[*idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RunIdentifier, RunFileSet)> {
        self.runs.iter()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Files that matched a pattern but carried no recognizable timestamp
    pub fn unmatched(&self) -> &[PathBuf] {
        &self.unmatched
    }

    fn entry(&mut self, id: RunIdentifier) -> &mut RunFileSet {
        let idx = match self.index.get(&id) {
            Some(idx) => *idx,
            None => {
                self.runs.push((id.clone(), RunFileSet::default()));
                self.index.insert(id, self.runs.len() - 1);
                self.runs.len() - 1
            }
        };
        &mut self.runs[idx].1
    }
}

impl IntoIterator for RunMap {
    type Item = (RunIdentifier, RunFileSet);
    type IntoIter = std::vec::IntoIter<(RunIdentifier, RunFileSet)>;

    fn into_iter(self) -> Self::IntoIter {
        self.runs.into_iter()
    }
}

/// RunGrouper scans a data directory and groups the raw files into runs.
///
/// File patterns are tried in order; the first one that matches anything is used,
/// since different acquisition setups name their files differently. Inside a run
/// the files are ordered by chunk, then by CoBo, then by AsAd module, then by name.
#[derive(Debug, Clone)]
pub struct RunGrouper {
    strategies: Vec<ExtractionStrategy>,
    split_chunks: bool,
}

impl Default for RunGrouper {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RunGrouper {
    pub fn new(split_chunks: bool) -> Self {
        Self {
            strategies: default_strategies(),
            split_chunks,
        }
    }

    /// Group the files of `data_path` into runs.
    ///
    /// A directory with no matching files gives an empty RunMap.
    pub fn group<S: AsRef<str>>(
        &self,
        data_path: &Path,
        patterns: &[S],
    ) -> Result<RunMap, GrouperError> {
        let listing = list_files(data_path)?;

        let mut matched: Vec<&DataFile> = Vec::new();
        for pattern in patterns {
            matched = listing
                .iter()
                .filter(|file| wildcard_match(pattern.as_ref(), &file.name))
                .collect();
            if !matched.is_empty() {
                log::info!(
                    "Found {} file(s) matching {} in {}",
                    matched.len(),
                    pattern.as_ref(),
                    data_path.to_string_lossy()
                );
                break;
            }
            log::debug!(
                "No files matching {} in {}, trying next pattern",
                pattern.as_ref(),
                data_path.to_string_lossy()
            );
        }

        let mut run_map = RunMap::default();
        // Keyed by everything that makes a file distinct; a repeated key replaces the earlier file
        let mut tagged: Vec<(FileTag, &DataFile)> = Vec::new();
        let mut seen: FxHashMap<FileTag, usize> = FxHashMap::default();
        for file in matched {
            match extract_file_tag(&file.name, &self.strategies) {
                Some(tag) => match seen.get(&tag) {
                    Some(idx) => {
                        log::warn!(
                            "{} duplicates {}, keeping the later file",
                            file.name,
                            tagged[*idx].1.name
                        );
                        tagged[*idx].1 = file;
                    }
                    None => {
                        seen.insert(tag.clone(), tagged.len());
                        tagged.push((tag, file));
                    }
                },
                None => {
                    log::warn!(
                        "Could not find a run timestamp in {}, skipping it",
                        file.name
                    );
                    run_map.unmatched.push(file.path.clone());
                }
            }
        }

        let mut order: FxHashMap<RunIdentifier, Vec<(FileTag, &DataFile)>> =
            FxHashMap::default();
        for (tag, file) in tagged {
            let id = tag.run_identifier(self.split_chunks);
            run_map.entry(id.clone());
            order.entry(id).or_default().push((tag, file));
        }

        for (id, set) in run_map.runs.iter_mut() {
            if let Some(mut files) = order.remove(&*id) {
                files.sort_by(|(a, a_file), (b, b_file)| {
                    (a.chunk_number(), a.cobo, a.module, &a_file.name).cmp(&(
                        b.chunk_number(),
                        b.cobo,
                        b.module,
                        &b_file.name,
                    ))
                });
                set.files = files.into_iter().map(|(_, file)| file.path.clone()).collect();
            }
        }

        Ok(run_map)
    }
}

/// A file of the data directory. `name` is only used for matching; `path` is the
/// real path, which survives names that are not valid UTF-8.
#[derive(Debug)]
struct DataFile {
    name: String,
    path: PathBuf,
}

/// The regular files in a directory, sorted by name so discovery order is stable
fn list_files(data_path: &Path) -> Result<Vec<DataFile>, GrouperError> {
    let entries = data_path
        .read_dir()
        .map_err(|e| GrouperError::BadDirectory(data_path.to_path_buf(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            continue;
        }
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        files.push(DataFile { name, path });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
