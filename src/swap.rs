//! Single-producer / single-consumer double buffer with an atomic hand-off.
//!
//! The foreground (producer) fills the back cell; the interrupt (consumer)
//! promotes it to front at a major-loop boundary. Front index and hand-off
//! state share one atomic byte so the consumer can never observe a front
//! index that disagrees with the state:
//!
//! ```text
//!            publish()                  publish() done
//!   Idle ───────────────► Writing ─────────────────────► Ready
//!    ▲                       ▲                             │
//!    │                       └──────── publish() ──────────┤
//!    └───────────── flip(): front ^= 1 ────────────────────┘
//! ```
//!
//! A publish that starts while an earlier one is still `Ready` takes the same
//! back cell over, so only the newest publish is ever shown. `flip()` refuses
//! to act while the producer is `Writing`.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicU8, Ordering};

const FRONT: u8 = 0b001;
const STATE: u8 = 0b110;
const IDLE: u8 = 0b000;
const WRITING: u8 = 0b010;
const READY: u8 = 0b100;

/// Two cells of `T`, one scanned and one being written.
pub(crate) struct SwapBuffer<T> {
    cells: [UnsafeCell<T>; 2],
    flags: AtomicU8,
}

// Safety: the producer only touches the back cell, the consumer only reads
// the front cell, and the front index changes only through `flip()` while no
// write is in progress.
unsafe impl<T: Send> Sync for SwapBuffer<T> {}

impl<T> SwapBuffer<T> {
    /// Both cells start with the same contents; cell 0 is front.
    pub(crate) fn new(init: T) -> Self
    where
        T: Clone,
    {
        Self {
            cells: [UnsafeCell::new(init.clone()), UnsafeCell::new(init)],
            flags: AtomicU8::new(IDLE),
        }
    }

    /// Index of the cell currently scanned.
    pub(crate) fn front_index(&self) -> usize {
        usize::from(self.flags.load(Ordering::Acquire) & FRONT)
    }

    /// Whether a published value is waiting for the next `flip()`.
    pub(crate) fn is_pending(&self) -> bool {
        self.flags.load(Ordering::Acquire) & STATE == READY
    }

    /// Producer side: fill the back cell and mark it ready.
    ///
    /// Must only be called from the single producer context.
    pub(crate) fn publish<R>(&self, fill: impl FnOnce(&mut T) -> R) -> R {
        let mut current = self.flags.load(Ordering::Acquire);
        loop {
            let claimed = (current & FRONT) | WRITING;
            match self.flags.compare_exchange_weak(
                current,
                claimed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let front = current & FRONT;
        let back = usize::from(front ^ 1);

        // Safety: while `Writing`, the consumer never flips, so the back cell
        // stays private to the producer.
        let result = fill(unsafe { &mut *self.cells[back].get() });

        self.flags.store(front | READY, Ordering::Release);
        result
    }

    /// Consumer side: promote a ready back cell to front.
    ///
    /// Returns `true` when a swap happened. Must only be called from the
    /// single consumer context.
    pub(crate) fn flip(&self) -> bool {
        let current = self.flags.load(Ordering::Acquire);
        if current & STATE != READY {
            return false;
        }
        let flipped = ((current & FRONT) ^ FRONT) | IDLE;
        self.flags
            .compare_exchange(current, flipped, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consumer side: the cell currently scanned.
    pub(crate) fn front(&self) -> &T {
        // Safety: the producer never writes the front cell.
        unsafe { &*self.cells[self.front_index()].get() }
    }

    /// Exclusive access to both cells, e.g. before the scan starts.
    pub(crate) fn reset(&mut self, init: T)
    where
        T: Clone,
    {
        *self.cells[0].get_mut() = init.clone();
        *self.cells[1].get_mut() = init;
        *self.flags.get_mut() = IDLE;
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, index: usize) -> &T {
        unsafe { &*self.cells[index].get() }
    }
}
