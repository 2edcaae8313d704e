//! Generation-based block coloring.
//!
//! Each graph lineage owns one monotonically increasing counter. A rewrite
//! pass draws three fresh watermarks from it:
//!
//! | watermark  | a block whose tag ...            |
//! |------------|----------------------------------|
//! | `explored` | `>= explored` was entered this pass |
//! | `changed`  | `== changed` was created this pass  |
//! | `repaired` | `== repaired` was fixed up by repair |
//!
//! Because every pass starts strictly above all earlier values, tags left
//! behind by earlier passes read as "not seen" without a reset sweep.

use std::cell::Cell;

/// Watermarks of one rewrite pass. `explored < changed < repaired`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Watermarks {
    pub explored: u64,
    pub changed: u64,
    pub repaired: u64,
}

impl Watermarks {
    /// Entered by the update phase (or created during this pass).
    #[inline]
    pub fn is_explored(self, tag: u64) -> bool {
        tag >= self.explored
    }

    /// Predates this pass: neither created nor cloned by it.
    #[inline]
    pub fn is_original(self, tag: u64) -> bool {
        tag < self.changed
    }

    #[inline]
    pub fn is_repaired(self, tag: u64) -> bool {
        tag == self.repaired
    }
}

/// Per-lineage color counter.
#[derive(Debug, Default)]
pub(crate) struct ColorClock {
    counter: Cell<u64>,
}

impl ColorClock {
    /// Hand out the watermarks for a new pass.
    pub fn next_pass(&self) -> Watermarks {
        let base = self.counter.get();
        let marks = Watermarks {
            explored: base + 1,
            changed: base + 2,
            repaired: base + 3,
        };
        self.counter.set(marks.repaired);
        marks
    }
}
