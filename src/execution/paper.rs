use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::execution::ExecutionAdapter;
use crate::types::*;

/// Paper venue: accepts every order, never fills, and keeps the working set
/// so a replay can report what would be resting.
#[derive(Default)]
pub struct PaperAdapter {
    next_id: AtomicU64,
    working: DashMap<OrderId, OpenOrder>,
    cancels: AtomicU64,
}

impl PaperAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working orders in the shape a trader update would report them.
    pub fn open_orders(&self) -> BTreeMap<OrderId, OpenOrder> {
        self.working
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect()
    }

    pub fn cancel_count(&self) -> u64 {
        self.cancels.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExecutionAdapter for PaperAdapter {
    async fn submit(&self, intent: OrderIntent) -> anyhow::Result<()> {
        let order_id = OrderId(format!("paper:{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
        info!(
            %order_id,
            security = %intent.security,
            side = ?intent.side,
            quantity = intent.quantity,
            price = intent.price,
            "paper order"
        );
        self.working.insert(
            order_id,
            OpenOrder {
                security: intent.security,
                side: intent.side,
                price: intent.price,
                quantity: intent.quantity,
            },
        );
        Ok(())
    }

    async fn cancel(&self, security: SecurityId, order_id: OrderId) -> anyhow::Result<()> {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        if self.working.remove(&order_id).is_none() {
            debug!(%security, %order_id, "cancel for unknown paper order");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::dispatch;

    #[tokio::test]
    async fn submit_then_cancel_round_trip() {
        let paper = PaperAdapter::new();
        dispatch(
            &paper,
            OrderAction::Submit(OrderIntent {
                security: SecurityId("X".into()),
                side: Side::Sell,
                quantity: 50,
                price: 101.0,
            }),
        )
        .await
        .unwrap();

        let open = paper.open_orders();
        assert_eq!(open.len(), 1);
        let (id, order) = open.into_iter().next().unwrap();
        assert_eq!(order.quantity, 50);

        dispatch(
            &paper,
            OrderAction::Cancel {
                security: SecurityId("X".into()),
                order_id: id,
            },
        )
        .await
        .unwrap();
        assert!(paper.open_orders().is_empty());
        assert_eq!(paper.cancel_count(), 1);
    }
}
