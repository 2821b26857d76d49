//! Change feed: bounded queue from store writers to the dispatcher.
//!
//! Writers hand events to a cloneable [`ChangeFeed`]; a single background
//! task drains the queue and calls [`EventDispatcher::dispatch`], so fan-out
//! never runs on the writer's task.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use livefeed_core::error::AppError;
use livefeed_core::events::ChangeEvent;
use livefeed_core::result::AppResult;
use livefeed_core::types::{EntityId, EntityType};

use crate::notification::dispatcher::EventDispatcher;

/// Producer side of the change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Creates a feed and the receiver the dispatch loop drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueues an event, waiting for room if the queue is full.
    pub async fn publish(&self, event: ChangeEvent) -> AppResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AppError::service_unavailable("Change feed is closed"))
    }

    /// Enqueues an event without waiting.
    pub fn try_publish(&self, event: ChangeEvent) -> AppResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AppError::service_unavailable("Change feed is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                AppError::service_unavailable("Change feed is closed")
            }
        })
    }

    /// Publishes a `created` event.
    pub async fn created(&self, entity_type: EntityType, entity_id: EntityId, data: Value) -> AppResult<()> {
        self.publish(ChangeEvent::created(entity_type, entity_id, data))
            .await
    }

    /// Publishes an `updated` event.
    pub async fn updated(&self, entity_type: EntityType, entity_id: EntityId, data: Value) -> AppResult<()> {
        self.publish(ChangeEvent::updated(entity_type, entity_id, data))
            .await
    }

    /// Publishes a `deleted` event.
    pub async fn deleted(&self, entity_type: EntityType, entity_id: EntityId, data: Value) -> AppResult<()> {
        self.publish(ChangeEvent::deleted(entity_type, entity_id, data))
            .await
    }
}

/// Spawns the task that drains the feed into the dispatcher.
///
/// On cancellation, events already queued are still dispatched before the
/// task exits.
pub fn spawn_dispatch_loop(
    mut rx: mpsc::Receiver<ChangeEvent>,
    dispatcher: Arc<EventDispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => {
                        dispatcher.dispatch(&event);
                    }
                    None => {
                        debug!("Change feed closed by all producers");
                        return;
                    }
                },
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Ok(event) = rx.try_recv() {
            dispatcher.dispatch(&event);
            drained += 1;
        }
        info!(drained, "Change feed dispatch loop stopped");
    })
}
