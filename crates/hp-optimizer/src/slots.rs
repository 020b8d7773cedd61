//! Occupancy flags for a fixed pool of execution slots.

use hp_types::SlotId;

/// One flag per slot; a set flag means a live trial holds the slot.
///
/// Allocation always hands out the lowest free id, so the assignment is a
/// pure function of which slots are occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    occupied: Vec<bool>,
}

impl SlotTable {
    pub fn new(slots: usize) -> Self {
        Self {
            occupied: vec![false; slots],
        }
    }

    pub fn capacity(&self) -> usize {
        self.occupied.len()
    }

    pub fn lowest_free(&self) -> Option<SlotId> {
        self.occupied.iter().position(|taken| !taken)
    }

    /// Take the lowest free slot, if any.
    pub fn acquire(&mut self) -> Option<SlotId> {
        let slot = self.lowest_free()?;
        self.occupied[slot] = true;
        Some(slot)
    }

    /// Mark `slot` free. Ids outside the table are ignored.
    pub fn release(&mut self, slot: SlotId) {
        if let Some(taken) = self.occupied.get_mut(slot) {
            *taken = false;
        }
    }

    pub fn is_occupied(&self, slot: SlotId) -> bool {
        self.occupied.get(slot).copied().unwrap_or(false)
    }

    pub fn occupied(&self) -> usize {
        self.occupied.iter().filter(|taken| **taken).count()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.occupied()
    }
}
