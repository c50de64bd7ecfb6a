//! Retention pass: age cleanup, capacity eviction, then compaction.
//!
//! Each step runs even if an earlier one failed; failures are logged and
//! counted in the report.

use cb_core::traits::ContentRepo;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenancePolicy {
    pub retention_days: u32,
    pub max_items: u64,
}

impl Default for MaintenancePolicy {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_items: 10_000,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: u64,
    pub evicted: u64,
    pub compacted: bool,
    pub failures: usize,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

pub async fn run_maintenance(repo: &dyn ContentRepo, policy: &MaintenancePolicy) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    match repo.cleanup_older_than(policy.retention_days).await {
        Ok(n) => report.expired = n,
        Err(e) => {
            error!(error = %e, "age cleanup failed");
            report.failures += 1;
        }
    }

    match repo.enforce_capacity(policy.max_items).await {
        Ok(n) => report.evicted = n,
        Err(e) => {
            error!(error = %e, "capacity enforcement failed");
            report.failures += 1;
        }
    }

    match repo.compact().await {
        Ok(()) => report.compacted = true,
        Err(e) => {
            error!(error = %e, "compaction failed");
            report.failures += 1;
        }
    }

    info!(
        expired = report.expired,
        evicted = report.evicted,
        compacted = report.compacted,
        "maintenance finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::{AppError, MockContentRepo};
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[tokio::test]
    async fn test_steps_run_in_order_with_policy_values() {
        let mut repo = MockContentRepo::new();
        let mut seq = Sequence::new();
        repo.expect_cleanup_older_than()
            .with(eq(7))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(3));
        repo.expect_enforce_capacity()
            .with(eq(100))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(2));
        repo.expect_compact()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let policy = MaintenancePolicy {
            retention_days: 7,
            max_items: 100,
        };
        let report = run_maintenance(&repo, &policy).await;

        assert_eq!(
            report,
            MaintenanceReport {
                expired: 3,
                evicted: 2,
                compacted: true,
                failures: 0,
            }
        );
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_steps() {
        let mut repo = MockContentRepo::new();
        repo.expect_cleanup_older_than()
            .returning(|_| Err(AppError::StorageError("disk I/O error".into())));
        repo.expect_enforce_capacity().times(1).returning(|_| Ok(0));
        repo.expect_compact()
            .times(1)
            .returning(|| Err(AppError::StorageError("database is locked".into())));

        let report = run_maintenance(&repo, &MaintenancePolicy::default()).await;

        assert_eq!(report.failures, 2);
        assert!(!report.compacted);
        assert_eq!(report.expired, 0);
    }
}
