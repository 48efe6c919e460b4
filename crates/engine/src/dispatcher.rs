use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{DataOrigin, RejectionReason};

use crate::live::Suggestion;
use crate::metrics::Metrics;

/// Everything the engine publishes for outside consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Suggestion(Suggestion),
    SignalRejected {
        pair: String,
        reason: RejectionReason,
    },
    BacktestCompleted {
        id: Uuid,
        pair: String,
        origin: DataOrigin,
        metrics: Metrics,
    },
}

/// Cloneable subscription point for the dispatcher's broadcast side.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

/// Moves events from the engines' bounded queue to every subscriber.
///
/// Producers never see subscribers: a slow subscriber lags on its own
/// broadcast receiver without back-pressuring the engine.
pub struct Dispatcher {
    rx: mpsc::Receiver<EngineEvent>,
    tx: broadcast::Sender<EngineEvent>,
}

impl Dispatcher {
    pub fn new(queue_depth: usize, fanout_capacity: usize) -> (Self, mpsc::Sender<EngineEvent>, EventBus) {
        let (event_tx, rx) = mpsc::channel(queue_depth.max(1));
        let (tx, _) = broadcast::channel(fanout_capacity.max(1));
        let bus = EventBus { tx: tx.clone() };
        (Self { rx, tx }, event_tx, bus)
    }

    /// Run until every producer has dropped its sender. Call from
    /// `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Dispatcher running");
        while let Some(event) = self.rx.recv().await {
            match self.tx.send(event) {
                Ok(n) => debug!(subscribers = n, "Event dispatched"),
                Err(_) => debug!("Event dropped, no subscribers"),
            }
        }
        warn!("Dispatcher: event channel closed");
    }
}
