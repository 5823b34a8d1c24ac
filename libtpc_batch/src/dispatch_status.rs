/// What the dispatcher is currently doing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DispatchPhase {
    #[default]
    Grouping,
    Waiting,
    Launched,
    Draining,
    Finished,
}

/// Progress message sent from the batch thread to whoever renders it.
#[derive(Debug, Clone, Default)]
pub struct DispatchStatus {
    pub phase: DispatchPhase,
    pub launched: usize,
    pub total: usize,
    pub live_jobs: usize,
    pub run_id: String,
}

impl DispatchStatus {
    pub fn new(
        phase: DispatchPhase,
        launched: usize,
        total: usize,
        live_jobs: usize,
        run_id: &str,
    ) -> Self {
        Self {
            phase,
            launched,
            total,
            live_jobs,
            run_id: run_id.to_string(),
        }
    }
}
