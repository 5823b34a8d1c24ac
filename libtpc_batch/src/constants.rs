/// Length of a GET DAQ timestamp window, `YYYY-MM-DDTHH:MM:SS.mmm`
pub const TIMESTAMP_LENGTH: usize = 23;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_LAUNCH_SETTLE_SECS: u64 = 2;

/// Raw file patterns in fallback order: per-AsAd GRAW, merged-AsAd GRAW, converted EventTPC
pub const DEFAULT_FILE_PATTERNS: [&str; 3] = ["CoBo0_AsAd*", "*ALL_AsAd*", "*EventTPC*"];
/// Resources in the work directory every job expects next to it
pub const DEFAULT_RESOURCE_PATTERNS: [&str; 2] = ["*Formats*", "*.dat"];

pub const JOB_LOG_EXTENSION: &str = "out";
pub const REVISION_FILE_NAME: &str = "git_revision.txt";
pub const UNKNOWN_REVISION: &str = "unknown";
