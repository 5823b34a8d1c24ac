use std::collections::VecDeque;
use std::path::Path;

use sysinfo::{Process, ProcessRefreshKind, ProcessStatus, System, UpdateKind};

/// Read access to the OS process table.
///
/// The dispatcher only ever counts; it never kills anything it finds here.
pub trait ProcessTable {
    /// Number of running processes whose name contains `name`
    fn count_matching_processes(&mut self, name: &str) -> usize;
}

/// ProcessTable backed by the live OS process list (via sysinfo)
pub struct SystemProcessTable {
    system: System,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl ProcessTable for SystemProcessTable {
    fn count_matching_processes(&mut self, name: &str) -> usize {
        // An unreadable table simply shows no processes
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        self.system
            .processes()
            .values()
            // Exited children nobody reaped linger as zombies; they hold no slot
            .filter(|process| process.status() != ProcessStatus::Zombie)
            .filter(|process| process_matches(process, name))
            .count()
    }
}

/// The kernel name of a process is cut to 15 characters on Linux, so the
/// executable path and argv[0] are checked as well.
fn process_matches(process: &Process, name: &str) -> bool {
    let exe = process.exe().and_then(file_name_of);
    let argv0 = process.cmd().first().and_then(|arg| file_name_of(Path::new(arg)));
    name_matches(name, process.name(), exe.as_deref(), argv0.as_deref())
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn name_matches(name: &str, kernel_name: &str, exe: Option<&str>, argv0: Option<&str>) -> bool {
    kernel_name.contains(name)
        || exe.is_some_and(|exe| exe.contains(name))
        || argv0.is_some_and(|arg| arg.contains(name))
}

/// ProcessTable which replays a scripted sequence of counts.
///
/// Once the script runs out the last count is repeated. Every query is recorded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcessTable {
    script: VecDeque<usize>,
    last: usize,
    queries: Vec<usize>,
}

impl ScriptedProcessTable {
    pub fn new<I: IntoIterator<Item = usize>>(counts: I) -> Self {
        Self {
            script: counts.into_iter().collect(),
            last: 0,
            queries: Vec::new(),
        }
    }

    /// The counts handed out so far, in order
    pub fn queries(&self) -> &[usize] {
        &self.queries
    }
}

impl ProcessTable for ScriptedProcessTable {
    fn count_matching_processes(&mut self, _name: &str) -> usize {
        if let Some(count) = self.script.pop_front() {
            self.last = count;
        }
        self.queries.push(self.last);
        self.last
    }
}
