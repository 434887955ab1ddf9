//! Platform integrations.
//!
//! The OS-level global hotkey registry lives behind [`HotkeyRegistry`] so the
//! shortcut dispatcher never touches platform APIs directly.

mod hotkeys;
mod native;

pub use hotkeys::{HotkeyCallback, HotkeyRegistry, InMemoryHotkeys};
pub use native::NativeHotkeys;
