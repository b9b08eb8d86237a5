//! Engine sessions: spawning the engine, the framed JSON-RPC channel to it,
//! and the pool that ties sessions to tree roots.

pub mod channel;
pub mod codec;
pub mod types;

pub(crate) mod connection;
pub(crate) mod protocol;

mod backend;
mod gateway;
mod launcher;
mod pool;
mod process;
mod session;

pub use backend::{EngineBackend, SessionUnavailable};
pub use channel::{ChannelAddress, ChannelStream};
pub use gateway::RpcGateway;
pub use launcher::{EngineLauncher, Launcher};
pub use pool::SessionPool;
pub use process::ChildGuard;
pub use protocol::RpcError;
pub use session::ProcessSession;
pub use types::{CloseReason, SessionEvent, SessionStatus};
