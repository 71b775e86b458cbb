use tracing::info;

/// Logs a line every `interval` ticks.
#[derive(Debug)]
pub struct ProgressLogger {
    interval: u64,
    message: &'static str,
    ticks: u64,
}

impl ProgressLogger {
    pub fn new(interval: u64, message: &'static str) -> Self {
        Self {
            interval: interval.max(1),
            message,
            ticks: 0,
        }
    }

    /// Records one unit of progress.
    pub fn tick(&mut self) {
        self.ticks += 1;
        if self.is_due() {
            info!(count = self.ticks, "{}", self.message);
        }
    }

    fn is_due(&self) -> bool {
        self.ticks % self.interval == 0
    }
}
