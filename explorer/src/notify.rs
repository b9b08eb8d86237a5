//! Change notification for tree hosts.
//!
//! Trees mutate their state and then tell the host what to redraw; the fetch
//! logic never talks to the host directly.

use tokio::sync::mpsc;

/// What a host should redraw or show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent<K> {
    /// One node's own label, icon or collapsibility changed.
    NodeChanged(K),
    /// Roots were added or removed.
    RootsChanged,
    /// A user-visible message (connection failures, skipped files).
    Message(String),
}

/// Sending half of a tree's event stream.
#[derive(Debug, Clone)]
pub struct Notifier<K> {
    tx: mpsc::UnboundedSender<TreeEvent<K>>,
}

impl<K> Notifier<K> {
    /// A notifier plus the receiver the host drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TreeEvent<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn node_changed(&self, key: K) {
        self.send(TreeEvent::NodeChanged(key));
    }

    pub fn roots_changed(&self) {
        self.send(TreeEvent::RootsChanged);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(TreeEvent::Message(text.into()));
    }

    // A host that stopped listening is not an error for the tree.
    fn send(&self, event: TreeEvent<K>) {
        let _ = self.tx.send(event);
    }
}
