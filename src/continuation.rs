//! Time-sliced cooperative work
//!
//! Long synchronous loops (replaying a ledger, materializing a large codec
//! graph) run on the caller's task. A [`TimeSlicer`] lets them give the
//! executor a turn whenever a wall-clock budget is exhausted, without
//! changing the order in which items are processed.

use std::time::{Duration, Instant};

/// Default work budget between yields.
pub const DEFAULT_TIME_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct TimeSlicer {
    budget: Duration,
    slice_start: Instant,
    yields: u64,
}

impl Default for TimeSlicer {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_SLICE)
    }
}

impl TimeSlicer {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            slice_start: Instant::now(),
            yields: 0,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of times the slicer has yielded so far.
    pub fn yields(&self) -> u64 {
        self.yields
    }

    /// Yields to the executor if the current slice is used up.
    pub async fn checkpoint(&mut self) {
        if self.slice_start.elapsed() >= self.budget {
            tokio::task::yield_now().await;
            self.yields += 1;
            self.slice_start = Instant::now();
        }
    }

    /// Feeds every item to `f` in order, yielding between items when the
    /// budget is exceeded. Stops at the first error.
    pub async fn for_each<I, F, E>(&mut self, items: I, mut f: F) -> Result<(), E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Result<(), E>,
    {
        self.slice_start = Instant::now();
        for item in items {
            f(item)?;
            self.checkpoint().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_processes_items_in_order() {
        let mut slicer = TimeSlicer::default();
        let mut seen = Vec::new();
        slicer
            .for_each(0..100, |i| {
                seen.push(i);
                Ok::<_, ()>(())
            })
            .await
            .unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stops_at_first_error() {
        let mut slicer = TimeSlicer::default();
        let mut seen = Vec::new();
        let result = slicer
            .for_each(0..10, |i| {
                if i == 3 {
                    return Err(i);
                }
                seen.push(i);
                Ok(())
            })
            .await;
        assert_eq!(result, Err(3));
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_zero_budget_yields_after_every_item() {
        let mut slicer = TimeSlicer::new(Duration::ZERO);
        slicer
            .for_each(0..5, |_| Ok::<_, ()>(()))
            .await
            .unwrap();
        assert_eq!(slicer.yields(), 5);
    }

    #[tokio::test]
    async fn test_generous_budget_does_not_yield() {
        let mut slicer = TimeSlicer::new(Duration::from_secs(3600));
        slicer
            .for_each(0..1000, |_| Ok::<_, ()>(()))
            .await
            .unwrap();
        assert_eq!(slicer.yields(), 0);
    }
}
