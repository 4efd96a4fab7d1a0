use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted by the core after a successful state change.
///
/// Consumers (notification fan-out, projections, audit streams) subscribe via
/// the channel receiver; the core never blocks on them beyond channel
/// backpressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock events
    StockReceived {
        stock_record_id: Uuid,
        quantity: i32,
        new_quantity: i32,
    },
    StockReserved {
        stock_record_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    },
    StockReleased {
        stock_record_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    },
    StockCommitted {
        stock_record_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    },
    StockRestocked {
        stock_record_id: Uuid,
        quantity: i32,
        reason: String,
        reference_id: Option<Uuid>,
    },
    StockAdjusted {
        stock_record_id: Uuid,
        delta: i32,
        reason: String,
    },
    /// Ledger insert failed after the stock record update succeeded.
    LedgerGapDetected {
        stock_record_id: Uuid,
        detail: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelRequested(Uuid),
    OrderCancelled(Uuid),

    // Return events
    ReturnRequested {
        return_id: Uuid,
        order_id: Uuid,
    },
    ReturnStatusChanged {
        return_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ReturnRefundRecorded {
        return_id: Uuid,
        method: String,
        confirmed_at: DateTime<Utc>,
    },
}

impl Event {
    /// Short name for logging and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockReceived { .. } => "stock.received",
            Event::StockReserved { .. } => "stock.reserved",
            Event::StockReleased { .. } => "stock.released",
            Event::StockCommitted { .. } => "stock.committed",
            Event::StockRestocked { .. } => "stock.restocked",
            Event::StockAdjusted { .. } => "stock.adjusted",
            Event::LedgerGapDetected { .. } => "stock.ledger_gap",
            Event::OrderCreated(_) => "order.created",
            Event::OrderStatusChanged { .. } => "order.status_changed",
            Event::OrderCancelRequested(_) => "order.cancel_requested",
            Event::OrderCancelled(_) => "order.cancelled",
            Event::ReturnRequested { .. } => "return.requested",
            Event::ReturnStatusChanged { .. } => "return.status_changed",
            Event::ReturnRefundRecorded { .. } => "return.refund_recorded",
        }
    }
}

/// Cloneable sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Creates a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event.
///
/// Runs until every sender is dropped. Spawn it once per process; tests spawn
/// it per harness.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::LedgerGapDetected {
                stock_record_id,
                detail,
            } => {
                // Alertable: a stock mutation has no ledger entry.
                error!(event = event.name(), %stock_record_id, detail, "ledger gap detected");
            }
            _ => {
                let payload = serde_json::to_string(&event)
                    .unwrap_or_else(|e| format!("<unserializable event: {e}>"));
                info!(event = event.name(), payload, "event");
            }
        }
    }
    warn!("event channel closed; consumer exiting");
}
