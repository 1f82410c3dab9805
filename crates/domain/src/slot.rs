//! Availability slots and the capacity invariant.

use chrono::{NaiveDate, NaiveTime};
use common::SlotId;
use serde::{Deserialize, Serialize};

use crate::booking::{CourseId, ProId};

/// Identifies a bookable (pro, course, date, tee time) unit.
///
/// Slots are created lazily on the first booking attempt for a key, so the
/// key doubles as the idempotent get-or-create lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Teaching pro the slot belongs to.
    pub pro_id: ProId,
    /// Course the lesson takes place on.
    pub course_id: CourseId,
    /// Lesson date.
    pub date: NaiveDate,
    /// Tee time.
    pub start_time: NaiveTime,
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{} {}",
            self.pro_id, self.course_id, self.date, self.start_time
        )
    }
}

/// A slot's capacity counters.
///
/// Invariant: `0 <= current_bookings <= max_players`, enforced by the
/// store's atomic check-and-increment. One booking consumes exactly one
/// unit of capacity regardless of its player count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Unique slot identifier.
    pub id: SlotId,
    /// The (pro, course, date, time) tuple this slot represents.
    pub key: SlotKey,
    /// Capacity ceiling, fixed at creation.
    pub max_players: u32,
    /// Bookings currently holding capacity.
    pub current_bookings: u32,
}

impl Slot {
    /// Creates an empty slot for a key.
    pub fn new(key: SlotKey, max_players: u32) -> Self {
        Self {
            id: SlotId::new(),
            key,
            max_players,
            current_bookings: 0,
        }
    }

    /// Returns true if another booking fits.
    pub fn has_capacity(&self) -> bool {
        self.current_bookings < self.max_players
    }

    /// Remaining capacity units.
    pub fn remaining(&self) -> u32 {
        self.max_players - self.current_bookings
    }
}
