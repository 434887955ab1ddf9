//! Session transport and backend.
//!
//! The client half ([`SessionHandle`]) talks to a session backend
//! ([`SessionServer`]) over a framed loopback TCP stream. Backends are
//! started as separate processes through [`launch_backend`].

mod handle;
mod process_info;
pub mod protocol;
mod pty_handler;
mod server;
pub mod spawn;
pub mod types;

pub use handle::{HandleId, SessionEvent, SessionHandle};
pub use process_info::{ProcessProbe, ProcessSnapshot};
pub use protocol::{Frame, ProtocolError};
pub use pty_handler::PtyHandler;
pub use server::{SessionOptions, SessionServer};
pub use spawn::{launch_backend, BackendCommand, SpawnReply};
pub use types::TermSize;
