// SPDX-License-Identifier: GPL-3.0
// consts.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

/// Compile-time knowledge about one guest register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct ConstEntry {
    is_const: bool,
    value: u32,

    // The value has not been written to the register's home yet.
    dirty: bool,
}

/// Dirty constants captured at a point in the block, so a cold path emitted
/// later can write back exactly what was pending there.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstSnapshot {
    pub dirty: Vec<(usize, u32)>,
}

/// The register/constant shadow table. It is reset at the start of every
/// compile and only describes the block being compiled.
pub struct ConstTracker {
    entries: [ConstEntry; 32],
}

impl ConstTracker {

    pub fn new() -> Self {
        let mut tracker = ConstTracker {
            entries: [ConstEntry::default(); 32],
        };
        tracker.reset();
        tracker
    }

    /// Forgets everything except that r0 is zero.
    pub fn reset(&mut self) {
        self.entries = [ConstEntry::default(); 32];
        self.entries[0] = ConstEntry { is_const: true, value: 0, dirty: false };
    }

    /// The known value of a register, if any.
    #[inline(always)]
    pub fn get(&self, reg: usize) -> Option<u32> {
        let entry = &self.entries[reg & 31];
        entry.is_const.then_some(entry.value)
    }

    /// Records a compile-time value. The register's home is now stale.
    pub fn set_const(&mut self, reg: usize, value: u32) {
        let reg = reg & 31;
        if reg != 0 {
            self.entries[reg] = ConstEntry { is_const: true, value, dirty: true };
        }
    }

    /// Records that a register now holds a runtime value in its home.
    pub fn set_unknown(&mut self, reg: usize) {
        let reg = reg & 31;
        if reg != 0 {
            self.entries[reg] = ConstEntry::default();
        }
    }

    pub fn is_dirty(&self, reg: usize) -> bool {
        self.entries[reg & 31].dirty
    }

    /// Records that a constant has been written to its home.
    pub fn mark_clean(&mut self, reg: usize) {
        self.entries[reg & 31].dirty = false;
    }

    /// Every constant whose home is stale, in register order.
    pub fn dirty_registers(&self) -> Vec<(usize, u32)> {
        self.entries.iter().enumerate()
            .filter(|(_, entry)| entry.is_const && entry.dirty)
            .map(|(reg, entry)| (reg, entry.value))
            .collect()
    }

    pub fn snapshot(&self) -> ConstSnapshot {
        ConstSnapshot { dirty: self.dirty_registers() }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn register_zero_should_stay_a_clean_zero() {

        let mut tracker = ConstTracker::new();
        tracker.set_const(0, 5);
        tracker.set_unknown(0);

        assert_eq!(tracker.get(0), Some(0));
        assert!(!tracker.is_dirty(0));
    }

    #[test]
    fn snapshot_should_capture_only_dirty_constants() {

        let mut tracker = ConstTracker::new();
        tracker.set_const(3, 7);
        tracker.set_const(4, 8);
        tracker.mark_clean(4);
        tracker.set_const(5, 9);
        tracker.set_unknown(5);

        assert_eq!(tracker.snapshot().dirty, vec![(3, 7)]);
        assert_eq!(tracker.get(4), Some(8));
        assert_eq!(tracker.get(5), None);

        tracker.reset();
        assert!(tracker.dirty_registers().is_empty());
    }
}
