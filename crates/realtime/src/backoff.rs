use std::time::Duration;

const DEFAULT_DELAYS_SECS: [u64; 5] = [2, 5, 10, 30, 60];

/// Delay schedule between reconnect attempts; the last entry repeats forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

impl ReconnectPolicy {
    /// An empty schedule falls back to the default one.
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            Self::default()
        } else {
            Self { delays }
        }
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Delay before the zero-based `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt)
            .unwrap_or(usize::MAX)
            .min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_caps_at_sixty_seconds() {
        let policy = ReconnectPolicy::default();
        let secs: Vec<u64> = (0..8).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(secs, vec![2, 5, 10, 30, 60, 60, 60, 60]);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn empty_schedule_uses_default() {
        assert_eq!(ReconnectPolicy::new(Vec::new()), ReconnectPolicy::default());
    }
}
