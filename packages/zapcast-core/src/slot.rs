//! Playback slot identifiers.
//!
//! The player surface is a fixed set of five slots: one full-screen single
//! view plus a 2x2 multiview grid. Slots are created once at startup and
//! never destroyed; channel and session bindings come and go.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of multiview grid positions.
pub const MULTIVIEW_SLOTS: u8 = 4;

/// Identifier for one fixed playback position.
///
/// Used directly as the key type in slot/monitor maps, so lookups are
/// typed rather than going through string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "view", content = "index", rename_all = "lowercase")]
pub enum SlotId {
    /// The full-screen single-view position.
    Single,
    /// One of the four multiview grid positions (0..=3).
    Multiview(u8),
}

impl SlotId {
    /// All five slots, single view first.
    pub const ALL: [SlotId; 5] = [
        SlotId::Single,
        SlotId::Multiview(0),
        SlotId::Multiview(1),
        SlotId::Multiview(2),
        SlotId::Multiview(3),
    ];

    /// Returns true for any multiview grid position.
    #[must_use]
    pub const fn is_multiview(&self) -> bool {
        matches!(self, Self::Multiview(_))
    }

    /// Returns the grid index for multiview slots, `None` for the single view.
    #[must_use]
    pub const fn multiview_index(&self) -> Option<u8> {
        match self {
            Self::Single => None,
            Self::Multiview(i) => Some(*i),
        }
    }

    /// Parses a multiview index into a slot id, rejecting out-of-range values.
    #[must_use]
    pub const fn multiview(index: u8) -> Option<SlotId> {
        if index < MULTIVIEW_SLOTS {
            Some(SlotId::Multiview(index))
        } else {
            None
        }
    }

    /// Position of this slot in [`SlotId::ALL`], usable as a dense array index.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Single => 0,
            Self::Multiview(i) => 1 + *i as usize,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiview(i) => write!(f, "multi-{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_five_distinct_slots() {
        assert_eq!(SlotId::ALL.len(), 5);
        for (i, a) in SlotId::ALL.iter().enumerate() {
            for b in SlotId::ALL.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn multiview_constructor_rejects_out_of_range() {
        assert_eq!(SlotId::multiview(3), Some(SlotId::Multiview(3)));
        assert_eq!(SlotId::multiview(4), None);
    }

    #[test]
    fn display_names_are_stable() {
        assert_eq!(SlotId::Single.to_string(), "single");
        assert_eq!(SlotId::Multiview(2).to_string(), "multi-2");
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&SlotId::Multiview(1)).expect("serialize");
        let back: SlotId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, SlotId::Multiview(1));
    }
}
