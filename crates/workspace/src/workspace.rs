//! Terminal session multiplexer.
//!
//! Five slots, each optionally bound to a session backend, one of them
//! focused. All state is owned by [`Multiplexer`], which reacts to
//! [`MuxEvent`]s on a single task. Collaborators (rendering, file browser,
//! process spawning, OS hotkeys) are reached through traits.

mod collaborators;
mod multiplexer;
pub mod navigation;
mod shortcuts;
mod spawn;
mod tab_registry;

pub use collaborators::{FileBrowser, Frontend, TabLabel};
pub use multiplexer::{Collaborators, FocusOutcome, MuxClient, MuxEvent, Multiplexer};
pub use shortcuts::{Binding, ShortcutDispatcher};
pub use spawn::{PendingSpawns, SpawnBroker, SpawnRequestId, SpawnTicket};
pub use tab_registry::{BoundSession, Released, SlotError, SlotState, TabRegistry};
