//! Live stock-change notification channel.
//!
//! An explicit connection-manager instance constructed once per process and
//! shared by handle; there is no process-global registry. Fan-out is
//! topic-less and best-effort: a disconnected client simply misses updates.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Frames pushed to connected clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum FeedMessage {
    StockUpdate { product_id: Uuid, stock: i32 },
    Private { sender: Uuid, message: String },
    Error { message: String },
}

/// Frames accepted from connected clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    PrivateMessage { recipient_id: Uuid, message: String },
}

/// Registry of authenticated live connections, keyed by user id.
#[derive(Default)]
pub struct StockFeed {
    connections: DashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>,
}

impl StockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a verified user and returns the receiving half of their
    /// outbound queue. A reconnect replaces the previous registration.
    pub fn register(&self, user_id: Uuid) -> mpsc::UnboundedReceiver<FeedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(user_id, tx);
        info!(user_id = %user_id, "Stock feed client connected");
        rx
    }

    pub fn unregister(&self, user_id: Uuid) {
        self.connections.remove(&user_id);
        info!(user_id = %user_id, "Stock feed client disconnected");
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Fans a stock change out to every connected client. Sends to closed
    /// receivers are ignored; cleanup happens when the socket task exits.
    pub fn broadcast_stock_update(&self, product_id: Uuid, stock: i32) {
        let frame = FeedMessage::StockUpdate { product_id, stock };
        for entry in self.connections.iter() {
            let _ = entry.value().send(frame.clone());
        }
        debug!(product_id = %product_id, stock, "Broadcast stock update");
    }

    /// Point-to-point delivery. An unknown recipient is a soft condition:
    /// the sender gets an error frame instead of the call failing.
    pub fn send_private(&self, sender: Uuid, recipient: Uuid, message: String) {
        match self.connections.get(&recipient) {
            Some(conn) => {
                let _ = conn.send(FeedMessage::Private { sender, message });
            }
            None => {
                debug!(recipient = %recipient, "Private message to unconnected receiver");
                if let Some(back) = self.connections.get(&sender) {
                    let _ = back.send(FeedMessage::Error {
                        message: "receiver not connected".to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_connected_client() {
        let feed = StockFeed::new();
        let mut rx_a = feed.register(Uuid::new_v4());
        let mut rx_b = feed.register(Uuid::new_v4());

        let product_id = Uuid::new_v4();
        feed.broadcast_stock_update(product_id, 7);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = rx.recv().await.expect("frame delivered");
            assert_eq!(
                frame,
                FeedMessage::StockUpdate {
                    product_id,
                    stock: 7
                }
            );
        }
    }

    #[tokio::test]
    async fn private_message_is_delivered_to_recipient_only() {
        let feed = StockFeed::new();
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let mut sender_rx = feed.register(sender);
        let mut recipient_rx = feed.register(recipient);

        feed.send_private(sender, recipient, "restock?".to_string());

        let frame = recipient_rx.recv().await.expect("delivered");
        assert_eq!(
            frame,
            FeedMessage::Private {
                sender,
                message: "restock?".to_string()
            }
        );
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn private_message_to_unconnected_receiver_errors_back_to_sender() {
        let feed = StockFeed::new();
        let sender = Uuid::new_v4();
        let mut sender_rx = feed.register(sender);

        feed.send_private(sender, Uuid::new_v4(), "anyone there?".to_string());

        let frame = sender_rx.recv().await.expect("error frame");
        assert_eq!(
            frame,
            FeedMessage::Error {
                message: "receiver not connected".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let feed = StockFeed::new();
        let user = Uuid::new_v4();
        let _rx = feed.register(user);
        assert_eq!(feed.connected_count(), 1);
        feed.unregister(user);
        assert_eq!(feed.connected_count(), 0);
    }
}
