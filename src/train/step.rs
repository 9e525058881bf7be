/// Training-batch counter shared by logging and telemetry.
///
/// Starts at 0, goes up by exactly one per consumed training batch and is
/// never lowered. `GlobalStep::get` after the first batch returns 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn new() -> GlobalStep {
        GlobalStep(0)
    }

    /// Advances by one and returns the new value.
    pub fn increment(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Raises the counter to a checkpointed value. Smaller values are ignored.
    pub fn resume_from(&mut self, step: u64) {
        self.0 = self.0.max(step);
    }
}
