//! Operator notification trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use domain::StockKey;
use serde::Serialize;

use crate::error::SagaError;

/// An event pushed to store operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewOrder {
        order_id: OrderId,
        amount: Money,
        items: u32,
    },
    LowStock {
        key: StockKey,
        product_name: String,
        remaining: i64,
        threshold: i64,
    },
}

impl Notification {
    /// Short title for push payloads.
    pub fn title(&self) -> String {
        match self {
            Notification::NewOrder { order_id, .. } => format!("New order {order_id}"),
            Notification::LowStock { product_name, .. } => format!("Low stock: {product_name}"),
        }
    }
}

/// Push notification provider.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail_on_send: bool,
}

/// In-memory notifier for testing. Records every delivered notification.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to reject every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.write().fail_on_send = fail;
    }

    /// Returns the notifications delivered so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryNotifierState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), SagaError> {
        let mut state = self.write();
        if state.fail_on_send {
            return Err(SagaError::external("notification", "push provider rejected"));
        }
        state.sent.push(notification);
        Ok(())
    }
}
