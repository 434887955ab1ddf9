//! Global shortcut dispatcher.
//!
//! Owns the shortcut table and every OS hotkey registration made from it.
//! Registrations are never patched in place: [`ShortcutDispatcher::rebuild`]
//! clears everything and registers the enabled entries again. Each rebuild
//! bumps a generation counter, and firings carry the generation they were
//! registered under, so a firing queued before a rebuild is dropped.

use actions::{expand_tab_template, AppAction, TAB_TEMPLATE};
use indexmap::IndexMap;
use platform::{HotkeyCallback, HotkeyRegistry};
use settings::{ShortcutClass, ShortcutEntry};
use std::sync::Arc;

/// What a registered trigger does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    App(AppAction),
    /// An `app` entry naming an action this build does not know. Fires a
    /// warning and reports failure.
    UnknownApp(String),
    /// Text typed into the focused session.
    Shell { text: String, linebreak: bool },
}

type FireFn = Arc<dyn Fn(u64, &str) + Send + Sync>;

pub struct ShortcutDispatcher {
    entries: Vec<ShortcutEntry>,
    registry: Box<dyn HotkeyRegistry>,
    bindings: IndexMap<String, Binding>,
    generation: u64,
    on_fire: FireFn,
}

impl ShortcutDispatcher {
    /// `on_fire` runs on whatever thread the hotkey registry fires on, with
    /// the generation and trigger of the firing.
    pub fn new(
        entries: Vec<ShortcutEntry>,
        registry: Box<dyn HotkeyRegistry>,
        on_fire: impl Fn(u64, &str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            entries,
            registry,
            bindings: IndexMap::new(),
            generation: 0,
            on_fire: Arc::new(on_fire),
        }
    }

    /// Replace the shortcut table. Takes effect on the next rebuild.
    pub fn set_entries(&mut self, entries: Vec<ShortcutEntry>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[ShortcutEntry] {
        &self.entries
    }

    /// Clear all registrations, then register every enabled entry.
    ///
    /// Returns the number of triggers registered. Calling it twice leaves
    /// the same registrations as calling it once.
    pub fn rebuild(&mut self) -> usize {
        self.clear();

        for entry in self.entries.iter().filter(|entry| entry.enabled) {
            for (trigger, binding) in resolve_entry(entry) {
                // Last registration wins; the trigger keeps its original position.
                if self.bindings.insert(trigger.clone(), binding).is_some() {
                    tracing::debug!(trigger = %trigger, "Duplicate trigger, later entry wins");
                }
            }
        }

        let generation = self.generation;
        let mut rejected = Vec::new();
        for trigger in self.bindings.keys() {
            let on_fire = self.on_fire.clone();
            let fired = trigger.clone();
            let callback: HotkeyCallback = Arc::new(move || on_fire(generation, &fired));
            if let Err(e) = self.registry.register(trigger, callback) {
                tracing::warn!(trigger = %trigger, "Failed to register shortcut: {:#}", e);
                rejected.push(trigger.clone());
            }
        }
        for trigger in rejected {
            self.bindings.shift_remove(&trigger);
        }

        tracing::debug!(
            generation,
            registered = self.bindings.len(),
            "Registered global shortcuts"
        );
        self.bindings.len()
    }

    /// Unregister everything. Pending firings become stale.
    pub fn clear(&mut self) {
        self.registry.unregister_all();
        self.bindings.clear();
        self.generation += 1;
    }

    /// Binding for a firing, or `None` when it is stale or unknown.
    pub fn resolve(&self, generation: u64, trigger: &str) -> Option<&Binding> {
        if generation != self.generation {
            tracing::debug!(trigger, generation, "Dropping shortcut fired before rebuild");
            return None;
        }
        self.bindings.get(trigger)
    }

    pub fn lookup(&self, trigger: &str) -> Option<&Binding> {
        self.bindings.get(trigger)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.bindings.iter().map(|(trigger, binding)| (trigger.as_str(), binding))
    }

    pub fn is_active(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(trigger, description)` rows for the shortcuts help.
    pub fn help(&self) -> Vec<(String, String)> {
        self.bindings()
            .map(|(trigger, binding)| {
                let description = match binding {
                    Binding::App(action) => action.description().to_string(),
                    Binding::UnknownApp(name) => format!("Unknown action {}", name),
                    Binding::Shell { text, .. } => format!("Type \"{}\"", text),
                };
                (trigger.to_string(), description)
            })
            .collect()
    }
}

/// Expand one enabled entry into the triggers it registers.
fn resolve_entry(entry: &ShortcutEntry) -> Vec<(String, Binding)> {
    match entry.class() {
        Some(ShortcutClass::App) if entry.action == TAB_TEMPLATE => {
            expand_tab_template(&entry.trigger)
                .into_iter()
                .map(|(trigger, action)| (trigger, Binding::App(action)))
                .collect()
        }
        Some(ShortcutClass::App) => {
            let binding = match entry.action.parse::<AppAction>() {
                Ok(action) => Binding::App(action),
                Err(_) => Binding::UnknownApp(entry.action.clone()),
            };
            vec![(entry.trigger.clone(), binding)]
        }
        Some(ShortcutClass::Shell) => vec![(
            entry.trigger.clone(),
            Binding::Shell {
                text: entry.action.clone(),
                linebreak: entry.linebreak,
            },
        )],
        None => {
            tracing::warn!(
                trigger = %entry.trigger,
                kind = %entry.kind,
                "Shortcut has unknown type, skipping"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use platform::InMemoryHotkeys;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    type Fired = Arc<Mutex<Vec<(u64, String)>>>;

    fn dispatcher(entries: Vec<ShortcutEntry>) -> (ShortcutDispatcher, InMemoryHotkeys, Fired) {
        let hotkeys = InMemoryHotkeys::new();
        let fired: Fired = Arc::default();
        let sink = fired.clone();
        let dispatcher = ShortcutDispatcher::new(entries, Box::new(hotkeys.clone()), move |g, t| {
            sink.lock().push((g, t.to_string()))
        });
        (dispatcher, hotkeys, fired)
    }

    #[test]
    fn tab_template_expands_to_five_triggers() {
        let (mut dispatcher, hotkeys, _) =
            dispatcher(vec![ShortcutEntry::app("Ctrl+Shift+X", "TAB_X")]);
        assert_eq!(dispatcher.rebuild(), 5);

        assert_eq!(
            hotkeys.registered(),
            vec![
                "Ctrl+Shift+1",
                "Ctrl+Shift+2",
                "Ctrl+Shift+3",
                "Ctrl+Shift+4",
                "Ctrl+Shift+5"
            ]
        );
        for slot in 0..5 {
            let trigger = format!("Ctrl+Shift+{}", slot + 1);
            assert_eq!(dispatcher.lookup(&trigger), Some(&Binding::App(AppAction::Tab(slot))));
        }
    }

    #[test]
    fn rebuild_twice_registers_once() {
        let (mut dispatcher, hotkeys, fired) =
            dispatcher(vec![ShortcutEntry::shell("F5", "ls -la", true)]);
        dispatcher.rebuild();
        dispatcher.rebuild();

        assert_eq!(hotkeys.len(), 1);
        assert!(hotkeys.fire("F5"));
        assert_eq!(fired.lock().len(), 1);
    }

    #[test]
    fn disabled_entries_are_skipped() {
        let (mut dispatcher, hotkeys, _) = dispatcher(vec![
            ShortcutEntry::app("Ctrl+Tab", "NEXT_TAB"),
            ShortcutEntry::app("Ctrl+X", "TAB_X").disabled(),
            ShortcutEntry::shell("F6", "neofetch", true).disabled(),
        ]);
        assert_eq!(dispatcher.rebuild(), 1);
        assert_eq!(hotkeys.registered(), vec!["Ctrl+Tab"]);
    }

    #[test]
    fn last_duplicate_wins() {
        let (mut dispatcher, hotkeys, _) = dispatcher(vec![
            ShortcutEntry::app("F1", "SETTINGS"),
            ShortcutEntry::shell("F1", "htop", true),
        ]);
        dispatcher.rebuild();

        assert_eq!(hotkeys.len(), 1);
        assert_eq!(
            dispatcher.lookup("F1"),
            Some(&Binding::Shell {
                text: "htop".into(),
                linebreak: true
            })
        );
    }

    #[test]
    fn unknown_app_action_is_registered_as_unknown() {
        let (mut dispatcher, _, _) = dispatcher(vec![ShortcutEntry::app("F2", "LAUNCH_ROCKET")]);
        dispatcher.rebuild();
        assert_eq!(
            dispatcher.lookup("F2"),
            Some(&Binding::UnknownApp("LAUNCH_ROCKET".into()))
        );
    }

    #[traced_test]
    #[test]
    fn unknown_type_is_skipped_with_warning() {
        let mut odd = ShortcutEntry::app("F3", "COPY");
        odd.kind = "macro".into();
        let (mut dispatcher, hotkeys, _) =
            dispatcher(vec![odd, ShortcutEntry::app("F4", "PASTE")]);

        assert_eq!(dispatcher.rebuild(), 1);
        assert_eq!(hotkeys.registered(), vec!["F4"]);
        assert!(logs_contain("unknown type"));
    }

    #[test]
    fn clear_unregisters_everything_and_stales_firings() {
        let (mut dispatcher, hotkeys, fired) = dispatcher(vec![
            ShortcutEntry::app("Ctrl+Tab", "NEXT_TAB"),
            ShortcutEntry::app("Ctrl+Shift+Tab", "PREVIOUS_TAB"),
            ShortcutEntry::shell("F5", "ls", true),
        ]);
        dispatcher.rebuild();
        hotkeys.fire("F5");
        let (generation, trigger) = fired.lock()[0].clone();
        assert!(dispatcher.resolve(generation, &trigger).is_some());

        dispatcher.clear();
        assert!(hotkeys.is_empty());
        assert!(!dispatcher.is_active());
        assert!(dispatcher.resolve(generation, &trigger).is_none());

        dispatcher.rebuild();
        assert_eq!(hotkeys.len(), 3);
        // Still stale: queued before the rebuild.
        assert!(dispatcher.resolve(generation, &trigger).is_none());
        assert!(dispatcher.resolve(dispatcher.generation(), &trigger).is_some());
    }

    #[test]
    fn rejected_trigger_does_not_block_others() {
        let (mut dispatcher, hotkeys, _) = dispatcher(vec![
            ShortcutEntry::shell(" ", "never", false),
            ShortcutEntry::app("Ctrl+Tab", "NEXT_TAB"),
        ]);
        assert_eq!(dispatcher.rebuild(), 1);
        assert_eq!(hotkeys.registered(), vec!["Ctrl+Tab"]);
        assert!(dispatcher.lookup(" ").is_none());
    }

    #[test]
    fn set_entries_applies_on_rebuild() {
        let (mut dispatcher, hotkeys, _) = dispatcher(vec![ShortcutEntry::app("F1", "SETTINGS")]);
        dispatcher.rebuild();
        dispatcher.set_entries(vec![ShortcutEntry::app("F2", "SHORTCUTS")]);
        assert_eq!(hotkeys.registered(), vec!["F1"]);

        dispatcher.rebuild();
        assert_eq!(hotkeys.registered(), vec!["F2"]);
    }

    #[test]
    fn help_describes_bindings() {
        let (mut dispatcher, _, _) = dispatcher(vec![
            ShortcutEntry::app("Ctrl+Tab", "NEXT_TAB"),
            ShortcutEntry::shell("F5", "ls", true),
        ]);
        dispatcher.rebuild();
        let help = dispatcher.help();
        assert_eq!(help[0].0, "Ctrl+Tab");
        assert_eq!(help[0].1, AppAction::NextTab.description());
        assert_eq!(help[1], ("F5".to_string(), "Type \"ls\"".to_string()));
    }
}
