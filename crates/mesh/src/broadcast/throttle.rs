/// Tick-based rate limiter for one beacon variant.
///
/// Ready when at least `period` ticks have passed since the last emission,
/// counting from tick 0: with a period of 5 the first emission is at tick 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastThrottle {
    period: u64,
    last_emit: u64,
}

impl BroadcastThrottle {
    /// Throttle emitting every `period` ticks (a period of 0 is treated as 1)
    pub fn new(period: u64) -> Self {
        Self {
            period: period.max(1),
            last_emit: 0,
        }
    }

    /// Ticks between emissions
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Tick of the last emission (0 before the first)
    pub fn last_emit(&self) -> u64 {
        self.last_emit
    }

    /// Whether an emission is due at `tick`
    pub fn is_ready(&self, tick: u64) -> bool {
        tick.saturating_sub(self.last_emit) >= self.period
    }

    /// Record an emission at `tick`
    pub fn record(&mut self, tick: u64) {
        self.last_emit = tick;
    }
}
