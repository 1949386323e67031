use async_trait::async_trait;

use crate::types::{OrderAction, OrderId, OrderIntent, SecurityId};

pub mod paper;

/// Outbound seam to the exchange session. Calls are fire-and-forget from the
/// engine's point of view: acknowledgements are the session's concern.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn submit(&self, intent: OrderIntent) -> anyhow::Result<()>;

    async fn cancel(&self, security: SecurityId, order_id: OrderId) -> anyhow::Result<()>;
}

/// Routes one engine action to the adapter.
pub async fn dispatch(adapter: &dyn ExecutionAdapter, action: OrderAction) -> anyhow::Result<()> {
    match action {
        OrderAction::Submit(intent) => adapter.submit(intent).await,
        OrderAction::Cancel { security, order_id } => adapter.cancel(security, order_id).await,
    }
}
