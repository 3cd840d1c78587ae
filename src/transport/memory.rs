//! In-process chat room.
//!
//! Every member of a [`MemoryHub`] sees every message posted by the other
//! members, tagged with the conversation it was posted to. Used to run both
//! tunnel peers inside one process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::error::{TunnelError, TunnelResult};
use crate::transport::{ConversationId, Inbound, InboundMessage, Transport};

struct Member {
    id: u64,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Default)]
struct HubState {
    members: Vec<Member>,
    closed: bool,
}

/// A shared room that fans messages out to its members.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
    next_member: Arc<AtomicU64>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room, posting into `conversation`.
    pub fn join(&self, conversation: ConversationId) -> (MemoryTransport, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_member.fetch_add(1, Ordering::Relaxed);
        self.lock().members.push(Member { id, tx });

        let transport = MemoryTransport {
            hub: self.clone(),
            member_id: id,
            conversation,
            max_message_len: None,
        };
        (transport, rx)
    }

    /// Deliver a message from outside the room to every member.
    pub fn post(&self, conversation: ConversationId, text: impl Into<String>) {
        self.broadcast(None, InboundMessage { conversation, text: text.into() });
    }

    /// Close the room. Every member's inbound stream ends and sends fail.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.members.clear();
    }

    fn broadcast(&self, from: Option<u64>, message: InboundMessage) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.members.retain(|member| {
            if Some(member.id) == from {
                return true;
            }
            // A member whose receiver is gone has left the room.
            member.tx.send(message.clone()).is_ok()
        });
        true
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One member's sending half.
pub struct MemoryTransport {
    hub: MemoryHub,
    member_id: u64,
    conversation: ConversationId,
    max_message_len: Option<usize>,
}

impl MemoryTransport {
    /// Reject messages longer than `limit`, like a real chat service would.
    pub fn with_max_message_len(mut self, limit: usize) -> Self {
        self.max_message_len = Some(limit);
        self
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, text: String) -> TunnelResult<()> {
        let message = InboundMessage {
            conversation: self.conversation,
            text,
        };
        if self.hub.broadcast(Some(self.member_id), message) {
            Ok(())
        } else {
            Err(TunnelError::TransportSend("memory hub closed".into()))
        }
    }

    fn max_message_len(&self) -> Option<usize> {
        self.max_message_len
    }
}
