//! Cooperative time limits for CPU-bound work

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::Error;

/// Deadline and cancellation flag polled by long-running searches.
///
/// Clones share the cancellation flag, so any clone can stop the work.
#[derive(Debug, Clone, Default)]
pub struct ComputeBudget {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl ComputeBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::default(),
        }
    }

    /// Optional timeout, unlimited when `None`
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::unlimited, Self::with_timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// # Errors
    ///
    /// [`Error::Cancelled`] after [`ComputeBudget::cancel`],
    /// [`Error::BudgetExhausted`] once the deadline has passed
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::BudgetExhausted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_expires() {
        assert!(ComputeBudget::unlimited().check().is_ok());
        assert!(ComputeBudget::from_timeout(None).deadline().is_none());
    }

    #[test]
    fn zero_timeout_is_exhausted() {
        let budget = ComputeBudget::with_timeout(Duration::ZERO);
        assert!(matches!(budget.check(), Err(Error::BudgetExhausted)));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let budget = ComputeBudget::with_timeout(Duration::from_secs(60));
        let clone = budget.clone();
        clone.cancel();
        assert!(matches!(budget.check(), Err(Error::Cancelled)));
    }
}
