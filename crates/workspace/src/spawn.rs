//! Spawn request correlation.

use crate::multiplexer::{MuxClient, MuxEvent};
use rustc_hash::FxHashMap;
use std::fmt;
use terminal::SpawnReply;
use uuid::Uuid;

/// Identity of one spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpawnRequestId(Uuid);

impl SpawnRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SpawnRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpawnRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-shot reply channel for a spawn request.
///
/// Replying consumes the ticket. A ticket dropped without a reply answers
/// with a failure, so every request gets exactly one reply.
#[derive(Debug)]
pub struct SpawnTicket {
    id: SpawnRequestId,
    client: Option<MuxClient>,
}

impl SpawnTicket {
    pub fn new(id: SpawnRequestId, client: MuxClient) -> Self {
        Self {
            id,
            client: Some(client),
        }
    }

    pub fn id(&self) -> SpawnRequestId {
        self.id
    }

    /// Deliver the raw reply string (`SUCCESS:<port>` or `ERROR...`).
    pub fn reply(mut self, reply: impl Into<String>) {
        self.send(reply.into());
    }

    pub fn succeed(self, port: u16) {
        self.reply(SpawnReply::Success { port }.to_string());
    }

    pub fn fail(self, details: impl Into<String>) {
        self.reply(
            SpawnReply::Failure {
                details: details.into(),
            }
            .to_string(),
        );
    }

    fn send(&mut self, reply: String) {
        if let Some(client) = self.client.take() {
            client.send(MuxEvent::SpawnReply { id: self.id, reply });
        }
    }
}

impl Drop for SpawnTicket {
    fn drop(&mut self) {
        if self.client.is_some() {
            tracing::warn!(request = %self.id, "Spawn ticket dropped without a reply");
            self.send(
                SpawnReply::Failure {
                    details: "spawn request dropped".into(),
                }
                .to_string(),
            );
        }
    }
}

/// Starts session backends on request.
///
/// Implementations may answer synchronously or from another task, but must
/// answer each ticket.
#[cfg_attr(test, mockall::automock)]
pub trait SpawnBroker {
    fn request_spawn(&mut self, ticket: SpawnTicket);
}

/// Outstanding spawn requests, keyed by id.
#[derive(Debug, Default)]
pub struct PendingSpawns {
    slots: FxHashMap<SpawnRequestId, usize>,
}

impl PendingSpawns {
    pub fn insert(&mut self, id: SpawnRequestId, slot: usize) {
        self.slots.insert(id, slot);
    }

    /// Claim the slot waiting on `id`. `None` for unknown or already
    /// answered requests.
    pub fn take(&mut self, id: SpawnRequestId) -> Option<usize> {
        self.slots.remove(&id)
    }

    pub fn is_pending(&self, slot: usize) -> bool {
        self.slots.values().any(|&s| s == slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
