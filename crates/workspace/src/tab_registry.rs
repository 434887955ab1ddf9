//! Slot states and the focused slot.

use crate::collaborators::TabLabel;
use crate::navigation;
use crate::spawn::SpawnRequestId;
use settings::constants::slots::{COUNT, PRIMARY};
use terminal::{HandleId, SessionHandle};

/// A slot with a live session.
pub struct BoundSession {
    pub port: u16,
    pub handle: SessionHandle,
    /// Last foreground process the backend reported.
    pub process: Option<String>,
    /// Last working directory the backend reported.
    pub cwd: Option<String>,
}

pub enum SlotState {
    Empty,
    Spawning(SpawnRequestId),
    Bound(BoundSession),
}

impl SlotState {
    pub fn is_bound(&self) -> bool {
        matches!(self, SlotState::Bound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot {0} does not exist")]
    OutOfRange(usize),
    #[error("the primary slot is never spawned or released")]
    Primary,
    #[error("slot {0} is not empty")]
    NotEmpty(usize),
    #[error("slot {0} is not waiting on spawn request {1}")]
    NotSpawning(usize, SpawnRequestId),
    #[error("slot {0} is not bound")]
    NotBound(usize),
    #[error("slot {0} is bound to a different session handle")]
    StaleHandle(usize),
}

/// A session removed from its slot by [`TabRegistry::release`].
pub struct Released {
    pub handle: SessionHandle,
    /// New focused slot, when the released slot was focused.
    pub refocused: Option<usize>,
}

/// Owns the five slots.
///
/// Invariants: slot 0 is always bound, and the focused slot is always bound.
/// Every transition goes through a method that keeps both.
pub struct TabRegistry {
    slots: [SlotState; COUNT],
    focused: usize,
    /// Slots whose last spawn attempt failed. Cleared on the next attempt.
    failed: [bool; COUNT],
}

impl TabRegistry {
    /// Registry with the primary session bound and focused.
    pub fn new(primary_port: u16, primary: SessionHandle) -> Self {
        let mut slots: [SlotState; COUNT] = std::array::from_fn(|_| SlotState::Empty);
        slots[PRIMARY] = SlotState::Bound(BoundSession {
            port: primary_port,
            handle: primary,
            process: None,
            cwd: None,
        });
        Self {
            slots,
            focused: PRIMARY,
            failed: [false; COUNT],
        }
    }

    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn state(&self, slot: usize) -> Option<&SlotState> {
        self.slots.get(slot)
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(SlotState::is_bound)
    }

    pub fn is_empty(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(SlotState::Empty))
    }

    pub fn is_spawning(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(SlotState::Spawning(_)))
    }

    pub fn session(&self, slot: usize) -> Option<&BoundSession> {
        match self.slots.get(slot) {
            Some(SlotState::Bound(session)) => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self, slot: usize) -> Option<&mut BoundSession> {
        match self.slots.get_mut(slot) {
            Some(SlotState::Bound(session)) => Some(session),
            _ => None,
        }
    }

    pub fn focused_session(&self) -> Option<&BoundSession> {
        self.session(self.focused)
    }

    pub fn focused_session_mut(&mut self) -> Option<&mut BoundSession> {
        self.session_mut(self.focused)
    }

    /// Session in `slot` if its handle is `handle`.
    pub fn session_for(&mut self, slot: usize, handle: HandleId) -> Option<&mut BoundSession> {
        self.session_mut(slot).filter(|s| s.handle.id() == handle)
    }

    /// Slots currently bound, ascending.
    pub fn bound_slots(&self) -> Vec<usize> {
        (0..COUNT).filter(|&slot| self.is_bound(slot)).collect()
    }

    /// `Empty -> Spawning`.
    pub fn begin_spawn(&mut self, slot: usize, id: SpawnRequestId) -> Result<(), SlotError> {
        self.check_secondary(slot)?;
        if !self.is_empty(slot) {
            return Err(SlotError::NotEmpty(slot));
        }
        self.slots[slot] = SlotState::Spawning(id);
        self.failed[slot] = false;
        Ok(())
    }

    /// `Spawning(id) -> Bound`.
    pub fn bind(
        &mut self,
        slot: usize,
        id: SpawnRequestId,
        port: u16,
        handle: SessionHandle,
    ) -> Result<(), SlotError> {
        self.check_spawning(slot, id)?;
        self.slots[slot] = SlotState::Bound(BoundSession {
            port,
            handle,
            process: None,
            cwd: None,
        });
        Ok(())
    }

    /// `Spawning(id) -> Empty`, remembering the failure for the label.
    pub fn fail_spawn(&mut self, slot: usize, id: SpawnRequestId) -> Result<(), SlotError> {
        self.check_spawning(slot, id)?;
        self.slots[slot] = SlotState::Empty;
        self.failed[slot] = true;
        Ok(())
    }

    /// Move focus to a bound slot. Returns the previously focused slot.
    pub fn set_focus(&mut self, slot: usize) -> Result<usize, SlotError> {
        if slot >= COUNT {
            return Err(SlotError::OutOfRange(slot));
        }
        if !self.is_bound(slot) {
            return Err(SlotError::NotBound(slot));
        }
        Ok(std::mem::replace(&mut self.focused, slot))
    }

    /// `Bound -> Empty` for the session whose handle is `handle`.
    ///
    /// When the slot was focused, focus moves to the previous bound slot.
    pub fn release(&mut self, slot: usize, handle: HandleId) -> Result<Released, SlotError> {
        self.check_secondary(slot)?;
        match &self.slots[slot] {
            SlotState::Bound(session) if session.handle.id() == handle => {}
            SlotState::Bound(_) => return Err(SlotError::StaleHandle(slot)),
            _ => return Err(SlotError::NotBound(slot)),
        }

        let SlotState::Bound(session) = std::mem::replace(&mut self.slots[slot], SlotState::Empty)
        else {
            return Err(SlotError::NotBound(slot));
        };

        let refocused = if self.focused == slot {
            let target = navigation::previous(slot, |s| self.is_bound(s));
            self.focused = target;
            Some(target)
        } else {
            None
        };

        Ok(Released {
            handle: session.handle,
            refocused,
        })
    }

    pub fn next(&self) -> usize {
        navigation::next(self.focused, |s| self.is_bound(s))
    }

    pub fn previous(&self) -> usize {
        navigation::previous(self.focused, |s| self.is_bound(s))
    }

    pub fn label(&self, slot: usize) -> TabLabel {
        match self.slots.get(slot) {
            None => TabLabel::Empty,
            Some(SlotState::Empty) if self.failed[slot] => TabLabel::Error,
            Some(SlotState::Empty) => TabLabel::Empty,
            Some(SlotState::Spawning(_)) => TabLabel::Loading,
            Some(SlotState::Bound(session)) => match (&session.process, slot) {
                (None, PRIMARY) => TabLabel::MainShell,
                (None, _) => TabLabel::Port(session.port),
                (Some(process), PRIMARY) => TabLabel::Main(process.clone()),
                (Some(process), _) => TabLabel::Numbered(slot + 1, process.clone()),
            },
        }
    }

    fn check_secondary(&self, slot: usize) -> Result<(), SlotError> {
        if slot >= COUNT {
            Err(SlotError::OutOfRange(slot))
        } else if slot == PRIMARY {
            Err(SlotError::Primary)
        } else {
            Ok(())
        }
    }

    fn check_spawning(&self, slot: usize, id: SpawnRequestId) -> Result<(), SlotError> {
        self.check_secondary(slot)?;
        match &self.slots[slot] {
            SlotState::Spawning(pending) if *pending == id => Ok(()),
            _ => Err(SlotError::NotSpawning(slot, id)),
        }
    }
}
