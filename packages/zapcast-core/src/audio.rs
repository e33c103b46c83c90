//! Audio routing across playback slots.
//!
//! At most one slot is audible at any time. The arbiter stores the
//! current selection and sweeps every sink on each change, forcing
//! `muted = (slot != selection)` rather than trusting earlier writes.
//! Selections pointing at slots that no longer hold a session are cleared
//! during the sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::player::SlotSinks;
use crate::slot::SlotId;

pub struct AudioArbiter {
    sinks: Arc<SlotSinks>,
    selection: RwLock<Option<SlotId>>,
    /// When set, activating a slot implicitly selects it for audio.
    follows_active: AtomicBool,
}

impl AudioArbiter {
    pub fn new(sinks: Arc<SlotSinks>, follows_active: bool) -> Self {
        Self {
            sinks,
            selection: RwLock::new(None),
            follows_active: AtomicBool::new(follows_active),
        }
    }

    /// The slot currently selected for audio, if any.
    pub fn selection(&self) -> Option<SlotId> {
        *self.selection.read()
    }

    pub fn audio_follows_active(&self) -> bool {
        self.follows_active.load(Ordering::SeqCst)
    }

    pub fn set_audio_follows_active(&self, enabled: bool) {
        self.follows_active.store(enabled, Ordering::SeqCst);
        log::info!("[Audio] follow-active {}", if enabled { "on" } else { "off" });
    }

    /// Stores a new selection and sweeps every sink.
    ///
    /// `occupied` reports whether a slot currently holds a session; a
    /// selection naming an empty slot is dropped before the sweep.
    pub fn set_audio_slot<F>(&self, selection: Option<SlotId>, occupied: F)
    where
        F: Fn(SlotId) -> bool,
    {
        *self.selection.write() = selection;
        self.enforce(occupied);
    }

    /// User gesture on a slot: selects it, or clears the selection when it
    /// is already selected. Returns the selection after the toggle.
    pub fn toggle_slot<F>(&self, slot: SlotId, occupied: F) -> Option<SlotId>
    where
        F: Fn(SlotId) -> bool,
    {
        let next = {
            let mut selection = self.selection.write();
            *selection = if *selection == Some(slot) {
                None
            } else {
                Some(slot)
            };
            *selection
        };
        match next {
            Some(slot) => log::info!("[Audio] selected {}", slot),
            None => log::info!("[Audio] muted all"),
        }
        self.enforce(occupied);
        next
    }

    /// Swap support: a selection bound to either slot follows its channel
    /// to the other index.
    pub fn remap_swap<F>(&self, a: SlotId, b: SlotId, occupied: F)
    where
        F: Fn(SlotId) -> bool,
    {
        {
            let mut selection = self.selection.write();
            *selection = match *selection {
                Some(s) if s == a => Some(b),
                Some(s) if s == b => Some(a),
                other => other,
            };
        }
        self.enforce(occupied);
    }

    /// Re-applies the single-unmuted-slot invariant across every sink.
    pub fn enforce<F>(&self, occupied: F)
    where
        F: Fn(SlotId) -> bool,
    {
        let selection = {
            let mut selection = self.selection.write();
            if let Some(slot) = *selection {
                if !occupied(slot) {
                    log::debug!("[Audio] dropping stale selection {}", slot);
                    *selection = None;
                }
            }
            *selection
        };

        for (slot, sink) in self.sinks.iter() {
            sink.set_muted(Some(slot) != selection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::MediaSink;
    use crate::test_support::{fake_sink_table, FakeSink};

    fn harness() -> (Arc<SlotSinks>, Vec<Arc<FakeSink>>) {
        fake_sink_table()
    }

    fn mute_states(fakes: &[Arc<FakeSink>]) -> Vec<bool> {
        fakes.iter().map(|s| s.muted()).collect()
    }

    #[test]
    fn selecting_a_slot_mutes_every_other_sink() {
        let (sinks, fakes) = harness();
        let arbiter = AudioArbiter::new(sinks, false);

        arbiter.toggle_slot(SlotId::Multiview(2), |_| true);

        assert_eq!(arbiter.selection(), Some(SlotId::Multiview(2)));
        assert_eq!(mute_states(&fakes), vec![true, true, true, false, true]);
    }

    #[test]
    fn reselecting_the_same_slot_mutes_all() {
        let (sinks, fakes) = harness();
        let arbiter = AudioArbiter::new(sinks, false);

        arbiter.toggle_slot(SlotId::Single, |_| true);
        assert_eq!(mute_states(&fakes), vec![false, true, true, true, true]);

        let after = arbiter.toggle_slot(SlotId::Single, |_| true);
        assert_eq!(after, None);
        assert_eq!(mute_states(&fakes), vec![true; 5]);
    }

    #[test]
    fn stale_selection_is_dropped_on_enforce() {
        let (sinks, fakes) = harness();
        let arbiter = AudioArbiter::new(sinks, false);
        arbiter.toggle_slot(SlotId::Multiview(0), |_| true);
        assert!(!fakes[1].muted());

        // The selected slot lost its session since.
        arbiter.enforce(|slot| slot != SlotId::Multiview(0));

        assert_eq!(arbiter.selection(), None);
        assert_eq!(mute_states(&fakes), vec![true; 5]);
    }

    #[test]
    fn swap_carries_the_selection_with_its_channel() {
        let (sinks, fakes) = harness();
        let arbiter = AudioArbiter::new(sinks, false);
        arbiter.toggle_slot(SlotId::Multiview(1), |_| true);

        arbiter.remap_swap(SlotId::Multiview(1), SlotId::Multiview(3), |_| true);

        assert_eq!(arbiter.selection(), Some(SlotId::Multiview(3)));
        assert_eq!(mute_states(&fakes), vec![true, true, true, true, false]);
    }

    #[test]
    fn swap_without_audio_involvement_changes_nothing() {
        let (sinks, _fakes) = harness();
        let arbiter = AudioArbiter::new(sinks, false);
        arbiter.toggle_slot(SlotId::Single, |_| true);

        arbiter.remap_swap(SlotId::Multiview(0), SlotId::Multiview(2), |_| true);

        assert_eq!(arbiter.selection(), Some(SlotId::Single));
    }
}
