// SPDX-License-Identifier: GPL-3.0-only

//! Drive-letter slots for multi-partition media

use storage_types::DriveLetter;

/// Bitmap of the 26 letters handed out to mounted sub-partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LetterAllocator {
    used: u32,
}

impl LetterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest free letter, marked used; `None` once all 26 are taken.
    pub fn allocate(&mut self) -> Option<DriveLetter> {
        let index = (0..DriveLetter::COUNT).find(|&i| self.used & (1 << i) == 0)?;
        self.used |= 1 << index;
        DriveLetter::from_index(index)
    }

    /// Mark a specific letter used; `false` if it already was.
    pub fn reserve(&mut self, letter: DriveLetter) -> bool {
        if self.is_used(letter) {
            return false;
        }
        self.used |= 1 << letter.index();
        true
    }

    pub fn release(&mut self, letter: DriveLetter) {
        self.used &= !(1 << letter.index());
    }

    pub fn is_used(&self, letter: DriveLetter) -> bool {
        self.used & (1 << letter.index()) != 0
    }

    pub fn in_use(&self) -> usize {
        self.used.count_ones() as usize
    }
}
