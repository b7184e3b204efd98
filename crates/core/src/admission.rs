// crates/core/src/admission.rs
//! Admission controller: bounds how many runners drive browser automation
//! at once.
//!
//! Browser automation is memory- and CPU-heavy, so the worker budget `K` is
//! a first-class, configurable parameter rather than an accident of
//! deployment. Excess submissions wait on the semaphore in arrival order
//! (tokio's semaphore queues waiters FIFO) and stay visible as `pending`
//! until a slot frees.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One held worker slot. Dropping it releases the slot, which starts the
/// next queued job (if any).
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

/// Caps concurrent active job runners at a configured limit.
#[derive(Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionController {
    /// Create a controller with a budget of `limit` concurrent workers.
    /// A limit of zero would deadlock every job, so it is clamped to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a worker slot, in arrival order.
    pub async fn admit(&self) -> WorkerPermit {
        // The semaphore is never closed, so acquisition only fails if the
        // controller itself is dropped mid-acquire, which clones prevent.
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("admission semaphore is never closed");
        WorkerPermit { _permit: permit }
    }

    /// The configured worker budget.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_zero_limit_is_clamped() {
        let controller = AdmissionController::new(0);
        assert_eq!(controller.limit(), 1);
        assert_eq!(controller.available(), 1);
    }

    #[tokio::test]
    async fn test_admit_up_to_limit() {
        let controller = AdmissionController::new(2);
        let a = controller.admit().await;
        let _b = controller.admit().await;
        assert_eq!(controller.available(), 0);

        drop(a);
        assert_eq!(controller.available(), 1);
    }

    #[test]
    fn test_excess_admissions_wait_for_a_slot() {
        let controller = AdmissionController::new(1);
        let held = {
            let mut first = task::spawn(controller.admit());
            assert_ready!(first.poll())
        };

        // The next admission parks until the held permit drops.
        let mut waiter = task::spawn(controller.admit());
        assert_pending!(waiter.poll());

        drop(held);
        assert!(waiter.is_woken());
        let _permit = assert_ready!(waiter.poll());
        assert_eq!(controller.available(), 0);
    }
}
