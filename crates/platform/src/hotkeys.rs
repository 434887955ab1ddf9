//! Global hotkey registry seam and an in-process implementation.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Zero-argument callback run when a registered trigger fires.
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// OS-level global hotkey registry.
///
/// Triggers use the "Modifier+Modifier+Key" grammar (e.g. `Ctrl+Shift+1`).
/// Registering a trigger that is already registered replaces its callback.
pub trait HotkeyRegistry {
    /// Register `trigger`. Fails if the platform rejects the chord.
    fn register(&mut self, trigger: &str, callback: HotkeyCallback) -> anyhow::Result<()>;

    /// Remove every registration made through this registry.
    fn unregister_all(&mut self);

    /// Currently registered triggers, in registration order.
    fn registered(&self) -> Vec<String>;
}

/// Hotkey registry that never leaves the process.
///
/// Used when no native registry is available (headless sessions) and by
/// tests. Clones share the same table, so one clone can be handed to the
/// dispatcher while another fires triggers.
#[derive(Clone, Default)]
pub struct InMemoryHotkeys {
    table: Arc<Mutex<IndexMap<String, HotkeyCallback>>>,
}

impl InMemoryHotkeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `trigger` as if the user pressed it. Returns false if it is not registered.
    pub fn fire(&self, trigger: &str) -> bool {
        // Clone out so the callback runs without holding the lock.
        let callback = self.table.lock().get(trigger).cloned();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => {
                tracing::debug!(trigger, "Fired trigger is not registered");
                false
            }
        }
    }

    pub fn is_registered(&self, trigger: &str) -> bool {
        self.table.lock().contains_key(trigger)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

impl HotkeyRegistry for InMemoryHotkeys {
    fn register(&mut self, trigger: &str, callback: HotkeyCallback) -> anyhow::Result<()> {
        if trigger.trim().is_empty() {
            anyhow::bail!("empty trigger");
        }
        self.table.lock().insert(trigger.to_string(), callback);
        Ok(())
    }

    fn unregister_all(&mut self) {
        self.table.lock().clear();
    }

    fn registered(&self) -> Vec<String> {
        self.table.lock().keys().cloned().collect()
    }
}
