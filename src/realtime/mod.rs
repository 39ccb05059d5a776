// src/realtime/mod.rs
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::models::CallKind;

/// Events pushed to connected clients. Delivery is at-most-once and purely
/// observational: a missing or dead channel never fails a state transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RealtimeEvent {
    IncomingCall {
        call_id: String,
        seeker_id: String,
        kind: CallKind,
    },
    CallAccepted {
        call_id: String,
    },
    CallRejected {
        call_id: String,
    },
    CallEnded {
        call_id: String,
        duration_seconds: i64,
        cost: Decimal,
    },
}

/// Per-user live channel map. The in-process implementation below is enough
/// for a single instance; a multi-instance deployment plugs in a broadcast
/// backend behind the same trait.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    fn register(&self, user_id: &str, handle: UnboundedSender<RealtimeEvent>);

    fn unregister(&self, user_id: &str);

    /// Fire-and-forget; never errors, never blocks.
    async fn send(&self, user_id: &str, event: RealtimeEvent);
}

pub struct InProcessChannelRegistry {
    channels: DashMap<String, UnboundedSender<RealtimeEvent>>,
}

impl InProcessChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }
}

impl Default for InProcessChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelRegistry for InProcessChannelRegistry {
    fn register(&self, user_id: &str, handle: UnboundedSender<RealtimeEvent>) {
        self.channels.insert(user_id.to_string(), handle);
    }

    fn unregister(&self, user_id: &str) {
        self.channels.remove(user_id);
    }

    async fn send(&self, user_id: &str, event: RealtimeEvent) {
        match self.channels.get(user_id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Dropping event for {}: channel closed", user_id);
                }
            }
            None => debug!("No live channel for {}; event dropped", user_id),
        }
    }
}
