use std::time::Duration;

/// A fixed trial budget for observing remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 40,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Calls `probe` until it yields a value, fails, or the budget is spent.
    ///
    /// Returns `Ok(None)` when every attempt came back empty. Sleeps between
    /// attempts, never after the last one.
    pub async fn run<T, E, F, Fut>(&self, mut probe: F) -> Result<Option<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        for attempt in 1..=self.attempts {
            if let Some(value) = probe(attempt).await? {
                return Ok(Some(value));
            }
            if attempt < self.attempts && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
        Ok(None)
    }
}
