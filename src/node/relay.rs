//! Best-chain announcements
//!
//! The chain pushes each new best block to a relay once it is committed. The
//! broadcast relay fans announcements out to any number of subscribers;
//! lagging subscribers lose the oldest announcements.

use tokio::sync::broadcast;
use tracing::trace;

use crate::crypto::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub hash: Hash,
    pub height: u32,
    pub trust: u64,
}

pub trait Relay: Send + Sync {
    fn push_relay(&self, announcement: Announcement);
}

/// Drops every announcement
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

impl Relay for NullRelay {
    fn push_relay(&self, _announcement: Announcement) {}
}

#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    sender: broadcast::Sender<Announcement>,
}

impl BroadcastRelay {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Announcement>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.sender.subscribe()
    }
}

impl Relay for BroadcastRelay {
    fn push_relay(&self, announcement: Announcement) {
        // No subscribers is not an error
        if self.sender.send(announcement).is_err() {
            trace!("no relay subscribers");
        }
    }
}
