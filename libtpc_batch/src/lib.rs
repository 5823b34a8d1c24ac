//! # tpc_batch
//!
//! tpc_batch drives batch analysis of TPC detector data. It walks directories of raw
//! data produced by the GET electronics (.graw files) or already converted EventTPC
//! files, groups the files into acquisition runs by their timestamp, and launches one
//! analysis job per run as a detached background process, never running more than a
//! configured number of jobs at once. Once all jobs are done, a finalize step collects
//! the per-run outputs into campaigns, merges them and makes summary plots.
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./tpc_batch_cli` from the top
//! level repository. The analysis executables, the merge utility (typically ROOT's
//! `hadd`) and the plotting tool are not part of this repository and must be on the
//! machine running the batch.
//!
//! ## Runs
//!
//! A run is identified by the DAQ timestamp found in its file names, with the colons
//! replaced by hyphens, e.g.
//!
//! ```text
//! CoBo0_AsAd0_ALL_2021-06-16T17:46:28.582_0000.graw -> 2021-06-16T17-46-28.582
//! ```
//!
//! Files are looked up with a fallback chain of patterns (`CoBo0_AsAd*`, then
//! `*ALL_AsAd*`, then `*EventTPC*` by default); the first pattern that matches any file
//! is used. All files sharing a timestamp form one run, ordered by chunk and then by
//! AsAd board. With `split_chunks` every chunk becomes its own run.
//!
//! ## Concurrency
//!
//! Jobs are plain OS processes that are never waited on; finished ones are only
//! reaped so they do not stay around as zombies. Before each launch the
//! process table is polled until fewer than `max_concurrent` processes whose name
//! contains the tracked process name are running. This is advisory: it assumes a single
//! batch controller, and a hung job holds its slot forever.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! work_path: /scratch/tpc/work
//! executable: ../../bin/makeTrackTree
//! process_name: null
//! max_concurrent: 4
//! poll_interval_secs: 10
//! launch_settle_secs: 2
//! file_patterns: ["CoBo0_AsAd*", "*ALL_AsAd*", "*EventTPC*"]
//! resource_patterns: ["*Formats*", "*.dat"]
//! split_chunks: false
//! extra_args: []
//! wait_for_completion: true
//! batches:
//!   - data_path: /data/IFJ_VdG_20210630/20210616_extTrg_CO2_250mbar_DT1470ET
//!     geometry_path: /resources/geometry_ELITPC_250mbar_12.5MHz.dat
//! finalize:
//!   top_path: null
//!   merge_program: hadd
//!   merge_args: ["-f"]
//!   result_pattern: "*.root"
//!   plot: null
//!   revision_path: /src/TPCReco
//!   campaigns:
//!     - name: IFJ_VdG
//!       runs: ["2021-06-16T17-46-28.582", "2021-06-22T12-01-56.568"]
//! ```
//!
//! Relative executable paths are resolved from inside the run directory, which is where
//! the job runs. Entries of the work directory matching `resource_patterns` are linked
//! into every run directory.
//!
//! ## Output
//!
//! ```text
//! work_path
//! |---- 2021-06-16T17-46-28.582
//! |    |---- 2021-06-16T17-46-28.582.out (job stdout + stderr)
//! |    |---- job outputs
//! top_path
//! |---- IFJ_VdG
//! |    |---- 2021-06-16T17-46-28.582 (moved run directory)
//! |    |---- IFJ_VdG.root (merged)
//! |    |---- plot script copy and plots
//! |    |---- git_revision.txt
//! ```
pub mod batch;
pub mod config;
pub mod constants;
pub mod dispatch_status;
pub mod dispatcher;
pub mod error;
pub mod finalize;
pub mod grouper;
pub mod job;
pub mod launcher;
pub mod process_table;
pub mod run_id;
pub mod wildcard;
pub mod workspace;
