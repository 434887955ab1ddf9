//! Global hotkeys registered with the operating system.

use crate::hotkeys::{HotkeyCallback, HotkeyRegistry};
use anyhow::{anyhow, Context, Result};
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// [`HotkeyRegistry`] backed by `global-hotkey`.
///
/// Callbacks run on the platform's event thread; they are expected to do no
/// more than post an event to the multiplexer.
pub struct NativeHotkeys {
    manager: GlobalHotKeyManager,
    registered: Vec<(String, HotKey)>,
    callbacks: Arc<Mutex<FxHashMap<u32, HotkeyCallback>>>,
}

impl NativeHotkeys {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("Failed to create global hotkey manager")?;
        let callbacks: Arc<Mutex<FxHashMap<u32, HotkeyCallback>>> = Arc::default();

        let dispatch = callbacks.clone();
        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            if event.state != HotKeyState::Pressed {
                return;
            }
            let callback = dispatch.lock().get(&event.id).cloned();
            if let Some(callback) = callback {
                callback();
            }
        }));

        Ok(Self {
            manager,
            registered: Vec::new(),
            callbacks,
        })
    }
}

impl HotkeyRegistry for NativeHotkeys {
    fn register(&mut self, trigger: &str, callback: HotkeyCallback) -> Result<()> {
        let hotkey: HotKey = trigger
            .parse()
            .map_err(|e| anyhow!("Invalid trigger '{}': {}", trigger, e))?;

        // Same chord registered twice: keep the OS registration, swap the callback.
        if let Some(index) = self.registered.iter().position(|(_, h)| h.id() == hotkey.id()) {
            self.registered[index].0 = trigger.to_string();
        } else {
            self.manager
                .register(hotkey)
                .with_context(|| format!("Failed to register global hotkey '{}'", trigger))?;
            self.registered.push((trigger.to_string(), hotkey));
        }
        self.callbacks.lock().insert(hotkey.id(), callback);
        Ok(())
    }

    fn unregister_all(&mut self) {
        let hotkeys: Vec<HotKey> = self.registered.drain(..).map(|(_, h)| h).collect();
        if let Err(e) = self.manager.unregister_all(&hotkeys) {
            tracing::warn!("Failed to unregister global hotkeys: {}", e);
        }
        self.callbacks.lock().clear();
    }

    fn registered(&self) -> Vec<String> {
        self.registered.iter().map(|(t, _)| t.clone()).collect()
    }
}

impl Drop for NativeHotkeys {
    fn drop(&mut self) {
        self.unregister_all();
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
    }
}
