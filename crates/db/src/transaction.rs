use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use shelfwise_core::domain::order::{OrderRequest, PlacedOrder};

use crate::repositories::{OrderPlacementError, OrderRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRetryPolicy {
    /// Extra attempts after the first one fails with lock contention.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1, delay: Duration::from_millis(100) }
    }
}

impl LockRetryPolicy {
    pub fn with_delay_ms(delay_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderAttempt {
    pub placed: PlacedOrder,
    pub attempts: u32,
}

/// Runs [`OrderRepository::place_order_once`] in a bounded loop. Only
/// [`OrderPlacementError::Busy`] is retried.
pub struct OrderTransaction<'a, R: OrderRepository + ?Sized> {
    orders: &'a R,
    policy: LockRetryPolicy,
}

impl<'a, R: OrderRepository + ?Sized> OrderTransaction<'a, R> {
    pub fn new(orders: &'a R, policy: LockRetryPolicy) -> Self {
        Self { orders, policy }
    }

    pub async fn place(&self, request: &OrderRequest) -> Result<OrderAttempt, OrderPlacementError> {
        let max_attempts = self.policy.max_retries + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.orders.place_order_once(request).await {
                Ok(placed) => {
                    if attempts > 1 {
                        info!(
                            event_name = "db.order.retry_succeeded",
                            attempts,
                            order_id = placed.order.id.0,
                            "order placed after lock contention"
                        );
                    }
                    return Ok(OrderAttempt { placed, attempts });
                }
                Err(OrderPlacementError::Busy(reason)) if attempts < max_attempts => {
                    warn!(
                        event_name = "db.order.lock_retry",
                        attempts,
                        max_attempts,
                        delay_ms = self.policy.delay.as_millis() as u64,
                        reason = %reason,
                        "order transaction hit lock contention, retrying"
                    );
                    sleep(self.policy.delay).await;
                }
                Err(OrderPlacementError::Busy(reason)) => {
                    warn!(
                        event_name = "db.order.lock_exhausted",
                        attempts,
                        reason = %reason,
                        "order transaction still locked after retry"
                    );
                    return Err(OrderPlacementError::Busy(reason));
                }
                Err(OrderPlacementError::Inconsistent(reason)) => {
                    error!(
                        event_name = "db.order.inconsistent",
                        attempts,
                        reason = %reason,
                        "order transaction could not confirm persistence"
                    );
                    return Err(OrderPlacementError::Inconsistent(reason));
                }
                Err(other) => return Err(other),
            }
        }
    }
}
