//! Admission control for database calls.

use crate::error::GatewayError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of queries running at once.
///
/// A request that cannot get a slot within `max_wait` is turned away with
/// [`GatewayError::TooManyRequests`] instead of queueing indefinitely.
#[derive(Debug, Clone)]
pub struct QueryLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    max_wait: Duration,
}

impl QueryLimiter {
    pub fn new(capacity: usize, max_wait: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_wait,
        }
    }

    /// Wait for a slot; the slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GatewayError> {
        match tokio::time::timeout(self.max_wait, Arc::clone(&self.permits).acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(GatewayError::TooManyRequests),
            Err(_) => {
                tracing::warn!(
                    capacity = self.capacity,
                    waited_ms = self.max_wait.as_millis() as u64,
                    "Query slot not available in time"
                );
                Err(GatewayError::TooManyRequests)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
