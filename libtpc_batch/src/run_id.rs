use std::fmt::Display;

use time::macros::format_description;
use time::PrimitiveDateTime;

use super::constants::TIMESTAMP_LENGTH;

/// RunIdentifier names one acquisition run.
///
/// It is the GET DAQ timestamp of the run with colons replaced by hyphens
/// (`2021-06-16T17-46-28.582`), optionally suffixed with a chunk id when runs are
/// split per chunk (`2021-06-16T17-46-28.582_0000`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunIdentifier {
    timestamp: String,
    suffix: Option<String>,
}

impl RunIdentifier {
    pub fn new(timestamp: &str) -> Self {
        Self {
            timestamp: normalize_timestamp(timestamp),
            suffix: None,
        }
    }

    pub fn with_suffix(timestamp: &str, suffix: &str) -> Self {
        Self {
            timestamp: normalize_timestamp(timestamp),
            suffix: Some(suffix.to_string()),
        }
    }

    /// Name of the run's working directory. Chunks of one run share it.
    pub fn directory_name(&self) -> &str {
        &self.timestamp
    }
}

impl Display for RunIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "{}_{}", self.timestamp, suffix),
            None => write!(f, "{}", self.timestamp),
        }
    }
}

/// Replace the colons of a DAQ timestamp so it can be used as a file name
pub fn normalize_timestamp(raw: &str) -> String {
    raw.replace(':', "-")
}

/// Check that a normalized window really is a timestamp
pub fn is_valid_timestamp(window: &str) -> bool {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:3]"
    );
    PrimitiveDateTime::parse(window, &format).is_ok()
}

/// A way of finding the timestamp inside a raw file name.
///
/// Marker strategies look for the last occurrence of a marker and slice the window
/// right behind it. The scan strategy takes the rightmost window anywhere in the
/// name that parses as a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Marker {
        name: &'static str,
        marker: &'static str,
    },
    Scan,
}

impl ExtractionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Marker { name, .. } => *name,
            Self::Scan => "scan",
        }
    }

    /// Returns the byte offset of the timestamp window in the file name
    pub fn locate(&self, file_name: &str) -> Option<usize> {
        match self {
            Self::Marker { marker, .. } => {
                let start = file_name.rfind(*marker)? + marker.len();
                let window = file_name.get(start..start + TIMESTAMP_LENGTH)?;
                if is_valid_timestamp(&normalize_timestamp(window)) {
                    Some(start)
                } else {
                    None
                }
            }
            Self::Scan => (0..file_name.len()).rev().find(|start| {
                file_name
                    .get(*start..*start + TIMESTAMP_LENGTH)
                    .is_some_and(|window| is_valid_timestamp(&normalize_timestamp(window)))
            }),
        }
    }
}

/// The strategies in the order they are tried
pub fn default_strategies() -> Vec<ExtractionStrategy> {
    vec![
        ExtractionStrategy::Marker {
            name: "event_tpc",
            marker: "EventTPC_",
        },
        ExtractionStrategy::Marker {
            name: "asad_all",
            marker: "AsAd_ALL_",
        },
        ExtractionStrategy::Marker {
            name: "all",
            marker: "ALL_",
        },
        ExtractionStrategy::Marker {
            name: "cobo",
            marker: "CoBo_",
        },
        ExtractionStrategy::Scan,
    ]
}

/// Everything the file name tells us about where a raw file belongs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTag {
    pub timestamp: String,
    pub cobo: Option<u8>,
    pub module: Option<u8>,
    pub chunk: Option<String>,
    pub strategy: &'static str,
}

impl FileTag {
    /// Run key this file belongs to. With `split_chunks` every chunk is its own run.
    pub fn run_identifier(&self, split_chunks: bool) -> RunIdentifier {
        match (&self.chunk, split_chunks) {
            (Some(chunk), true) => RunIdentifier::with_suffix(&self.timestamp, chunk),
            _ => RunIdentifier::new(&self.timestamp),
        }
    }

    /// Chunk number, used for ordering files inside a run
    pub fn chunk_number(&self) -> Option<u32> {
        self.chunk.as_ref().and_then(|c| c.parse().ok())
    }
}

/// Extract the run timestamp, CoBo, AsAd module and chunk of a raw file name.
///
/// Returns None if no strategy finds a timestamp.
pub fn extract_file_tag(file_name: &str, strategies: &[ExtractionStrategy]) -> Option<FileTag> {
    let (start, strategy) = strategies
        .iter()
        .find_map(|s| s.locate(file_name).map(|start| (start, s.name())))?;
    let end = start + TIMESTAMP_LENGTH;
    let timestamp = normalize_timestamp(&file_name[start..end]);

    Some(FileTag {
        timestamp,
        cobo: extract_board(file_name, "CoBo"),
        module: extract_board(file_name, "AsAd"),
        chunk: extract_chunk(&file_name[end..]),
        strategy,
    })
}

/// Extract just the RunIdentifier of a raw file name with the default strategies
pub fn extract_run_identifier(file_name: &str) -> Option<RunIdentifier> {
    extract_file_tag(file_name, &default_strategies()).map(|tag| tag.run_identifier(false))
}

/// The board number written right after `board`, e.g. `CoBo1` or `AsAd3`.
/// `CoBo_ALL` and `AsAd_ALL` carry no number.
fn extract_board(file_name: &str, board: &str) -> Option<u8> {
    file_name.match_indices(board).find_map(|(idx, _)| {
        file_name[idx + board.len()..]
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map(|d| d as u8)
    })
}

/// The chunk counter following the timestamp, e.g. `_0003.graw` -> `0003`
fn extract_chunk(tail: &str) -> Option<String> {
    let digits: String = tail
        .strip_prefix('_')?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
