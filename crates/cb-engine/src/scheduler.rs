use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::Engine;

/// Randomized pause between cycles, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWindow {
    pub min: Duration,
    pub max: Duration,
}

impl Default for SleepWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(7200),
            max: Duration::from_secs(14400),
        }
    }
}

impl SleepWindow {
    pub fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min.min(max)),
            max: Duration::from_secs(max.max(min)),
        }
    }

    /// Whole seconds drawn uniformly from the window.
    pub fn pick(&self) -> Duration {
        let (lo, hi) = (self.min.as_secs(), self.max.as_secs());
        if lo >= hi {
            return self.min;
        }
        Duration::from_secs(rand::rng().random_range(lo..=hi))
    }
}

impl Engine {
    /// Runs cycles until `shutdown` resolves. The shutdown future is polled
    /// only while sleeping, so a cycle in progress always completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let report = self.run_cycle().await;
            info!(
                generated = ?report.generated,
                publish = ?report.publish,
                "cycle complete"
            );

            let wait = self.options().sleep.pick();
            info!(seconds = wait.as_secs(), "sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineOptions;
    use cb_core::{AppError, MockContentGenerator, MockContentRepo, MockPublisher, RecentTopics};
    use std::sync::Arc;

    #[test]
    fn test_pick_stays_within_window() {
        let window = SleepWindow::from_secs(10, 20);
        for _ in 0..200 {
            let wait = window.pick();
            assert!(wait >= Duration::from_secs(10) && wait <= Duration::from_secs(20));
        }
    }

    #[test]
    fn test_degenerate_and_inverted_windows() {
        assert_eq!(SleepWindow::from_secs(5, 5).pick(), Duration::from_secs(5));
        let inverted = SleepWindow::from_secs(30, 10);
        assert_eq!(inverted.min, Duration::from_secs(10));
        assert_eq!(inverted.max, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_after_one_cycle() {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate_text()
            .times(1)
            .returning(|_| Err(AppError::GenerationError("offline".into())));
        let mut repo = MockContentRepo::new();
        repo.expect_next_authorized().times(1).returning(|| Ok(None));
        repo.expect_cleanup_older_than().times(1).returning(|_| Ok(0));
        repo.expect_enforce_capacity().times(1).returning(|_| Ok(0));
        repo.expect_compact().times(1).returning(|| Ok(()));

        let mut engine = Engine::new(
            Arc::new(repo),
            Arc::new(generator),
            Arc::new(MockPublisher::new()),
            RecentTopics::default(),
            EngineOptions::default(),
        );
        engine.run(async {}).await;
    }
}
