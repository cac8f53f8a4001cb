//! Clock-domain crossing queue.
//!
//! A bounded FIFO whose write side and read side may live in different clock
//! domains (or different threads). Each side advances only its own position;
//! positions run over `[0, 2 * capacity)` so that full and empty are told apart
//! without a shared counter. The other side's position is observed with
//! acquire ordering, so a stale view is always conservative: the writer may
//! think the queue is fuller than it is, the reader that it is emptier.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// A slot is touched by the writer before `write_pos` is published and by the
// reader only after observing it, so the two sides never alias a slot.
unsafe impl<T: Send> Sync for Ring<T> {}
unsafe impl<T: Send> Send for Ring<T> {}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "clock-domain queue capacity must be non-zero");
        assert!(
            capacity <= usize::MAX / 2,
            "clock-domain queue capacity too large"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            slots,
            capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn advance(&self, pos: usize) -> usize {
        let next = pos + 1;
        if next == 2 * self.capacity {
            0
        } else {
            next
        }
    }

    #[inline]
    fn occupancy(&self, write: usize, read: usize) -> usize {
        (write + 2 * self.capacity - read) % (2 * self.capacity)
    }

    #[inline]
    fn slot(&self, pos: usize) -> *mut MaybeUninit<T> {
        self.slots[pos % self.capacity].get()
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut read = *self.read_pos.get_mut();
        let write = *self.write_pos.get_mut();
        while read != write {
            let idx = read % self.capacity;
            // SAFETY: every position in [read, write) holds an initialised value.
            unsafe { self.slots[idx].get_mut().assume_init_drop() };
            read = self.advance(read);
        }
    }
}

/// Write half of a clock-domain queue.
pub struct QueueWriter<T> {
    ring: Arc<Ring<T>>,
    pos: usize,
}

impl<T> QueueWriter<T> {
    /// Append `payload`. A full queue hands the payload back.
    pub fn write(&mut self, payload: T) -> Result<(), T> {
        let read = self.ring.read_pos.load(Ordering::Acquire);
        if self.ring.occupancy(self.pos, read) == self.ring.capacity {
            return Err(payload);
        }
        // SAFETY: the slot at `pos` is outside [read, write) so the reader
        // cannot touch it until `write_pos` is published below.
        unsafe { (*self.ring.slot(self.pos)).write(payload) };
        self.pos = self.ring.advance(self.pos);
        self.ring.write_pos.store(self.pos, Ordering::Release);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.ring.capacity
    }

    /// Occupancy as seen from the write side.
    pub fn len(&self) -> usize {
        let read = self.ring.read_pos.load(Ordering::Acquire);
        self.ring.occupancy(self.pos, read)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }
}

/// Read half of a clock-domain queue.
pub struct QueueReader<T> {
    ring: Arc<Ring<T>>,
    pos: usize,
}

impl<T> QueueReader<T> {
    /// Remove the oldest payload, if any.
    pub fn read(&mut self) -> Option<T> {
        let write = self.ring.write_pos.load(Ordering::Acquire);
        if self.pos == write {
            return None;
        }
        // SAFETY: `pos` is inside [read, write), initialised by the writer and
        // published with release ordering.
        let payload = unsafe { (*self.ring.slot(self.pos)).assume_init_read() };
        self.pos = self.ring.advance(self.pos);
        self.ring.read_pos.store(self.pos, Ordering::Release);
        Some(payload)
    }

    /// Borrow the oldest payload without removing it.
    pub fn peek(&self) -> Option<&T> {
        let write = self.ring.write_pos.load(Ordering::Acquire);
        if self.pos == write {
            return None;
        }
        // SAFETY: as in `read`; the writer cannot reuse the slot before
        // `read_pos` moves, which needs `&mut self`.
        Some(unsafe { (*self.ring.slot(self.pos)).assume_init_ref() })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy as seen from the read side.
    pub fn len(&self) -> usize {
        let write = self.ring.write_pos.load(Ordering::Acquire);
        self.ring.occupancy(write, self.pos)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }
}

/// Bounded FIFO between two clock domains. Use directly from a single
/// context, or `split()` into halves owned by each domain.
pub struct ClockDomainQueue<T> {
    writer: QueueWriter<T>,
    reader: QueueReader<T>,
}

impl<T> ClockDomainQueue<T> {
    /// Create a queue holding at most `capacity` payloads.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let ring = Arc::new(Ring::new(capacity));
        Self {
            writer: QueueWriter {
                ring: Arc::clone(&ring),
                pos: 0,
            },
            reader: QueueReader { ring, pos: 0 },
        }
    }

    pub fn write(&mut self, payload: T) -> Result<(), T> {
        self.writer.write(payload)
    }

    pub fn read(&mut self) -> Option<T> {
        self.reader.read()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.writer.is_full()
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    pub fn capacity(&self) -> usize {
        self.writer.capacity()
    }

    pub fn split(self) -> (QueueWriter<T>, QueueReader<T>) {
        (self.writer, self.reader)
    }
}

impl<T> fmt::Debug for ClockDomainQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockDomainQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
