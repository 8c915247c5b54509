/// Mutable per-binding scheduler state
///
/// Owned by exactly one schedule entry and only written by its invoker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleState {
    previous_invocation: Option<i64>,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as if the handler last ran at `epoch_seconds`
    pub fn with_previous(epoch_seconds: i64) -> Self {
        Self {
            previous_invocation: Some(epoch_seconds),
        }
    }

    /// Epoch seconds of the last recorded invocation
    pub fn previous_invocation(&self) -> Option<i64> {
        self.previous_invocation
    }

    pub fn record_invocation(&mut self, epoch_seconds: i64) {
        self.previous_invocation = Some(epoch_seconds);
    }
}
