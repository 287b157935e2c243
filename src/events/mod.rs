use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::stock_feed::StockFeed;

/// Domain events emitted by the services and consumed by the in-process
/// event loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ProductCreated(Uuid),
    StockAdjusted { product_id: Uuid, new_stock: i32 },
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),
    CouponCreated(Uuid),
    CouponRedeemed { code: String },
    OrderCreated(Uuid),
    OrderCompleted(Uuid),
    OrderCancelled(Uuid),
    OrderSettled { order_id: Uuid, payment_intent: String },
    CheckoutSessionCreated { order_id: Uuid, session_id: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged and swallowed so
    /// event delivery never fails a business operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Event processing loop, spawned once at startup. Logs every event and
/// fans stock changes out through the live notification channel.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, stock_feed: Arc<StockFeed>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAdjusted {
                product_id,
                new_stock,
            } => {
                info!(product_id = %product_id, new_stock, "Stock adjusted");
                stock_feed.broadcast_stock_update(*product_id, *new_stock);
            }
            Event::OrderSettled {
                order_id,
                payment_intent,
            } => {
                info!(order_id = %order_id, payment_intent = %payment_intent, "Order settled");
            }
            other => {
                info!("Event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
