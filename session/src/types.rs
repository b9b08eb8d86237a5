//! Public types consumed by the trees and the host.

use fcs_types::RootId;

/// Lifecycle state of a [`ProcessSession`](crate::ProcessSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No process, no connection.
    Disconnected,
    /// Inside `open`: spawning, waiting for the engine, or handshaking.
    Connecting,
    /// Handshake acknowledged; requests may be sent.
    Started,
}

/// Why the engine end of a channel went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The engine closed the channel cleanly.
    Exited,
    /// The channel broke (malformed frame, IO error).
    Failed(String),
}

/// Emitted by a session's reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The remote end closed the connection without being asked to.
    Closed { root: RootId, reason: CloseReason },
}
