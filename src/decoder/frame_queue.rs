//! Bounded frame buffer shared by the decoder and render threads
//!
//! The queue never blocks on its own. Callers take the lock, look at the
//! fill level, wait on one of the three conditions with a timeout and only
//! then enqueue or dequeue. That leaves room to check the exit flag or a
//! redirect request between the wait and the operation.

use crate::utils::error::{Result, VobPlayerError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Fixed-capacity circular buffer of owned frames
pub struct FrameQueue<T> {
    /// Slot storage and cursors, guarded by the single queue mutex
    slots: Mutex<Slots<T>>,

    /// Signaled on every insert
    not_empty: Condvar,

    /// Signaled on every removal
    not_full: Condvar,

    /// Signaled when the fill level drops to zero
    empty: Condvar,

    capacity: usize,
}

struct Slots<T> {
    /// Each occupied slot owns its frame exclusively
    buf: Box<[Option<T>]>,
    front: usize,
    rear: usize,
    size: usize,
}

/// Exclusive access to the queue contents
///
/// Obtained from [`FrameQueue::lock`]. All reads of the fill level and all
/// mutations go through this guard.
pub struct QueueGuard<'a, T> {
    queue: &'a FrameQueue<T>,
    slots: MutexGuard<'a, Slots<T>>,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(VobPlayerError::InvalidInput(
                "frame queue capacity must be non-zero".to_string(),
            ));
        }

        let buf = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();

        Ok(Self {
            slots: Mutex::new(Slots {
                buf,
                front: 0,
                rear: 0,
                size: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            empty: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire the queue mutex
    pub fn lock(&self) -> QueueGuard<'_, T> {
        QueueGuard {
            queue: self,
            slots: self.slots.lock(),
        }
    }

    /// Drop every buffered frame and reset the cursors
    ///
    /// Returns how many frames were discarded.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let mut dropped = 0;
        for slot in slots.buf.iter_mut() {
            if slot.take().is_some() {
                dropped += 1;
            }
        }
        slots.front = 0;
        slots.rear = 0;
        slots.size = 0;

        self.empty.notify_all();
        // A producer parked on a full queue can move on as well
        self.not_full.notify_all();
        dropped
    }

    /// Number of frames currently buffered
    pub fn len(&self) -> usize {
        self.slots.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, T> QueueGuard<'a, T> {
    pub fn len(&self) -> usize {
        self.slots.size
    }

    pub fn is_empty(&self) -> bool {
        self.slots.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.size == self.queue.capacity
    }

    /// Move `frame` into the rear slot
    ///
    /// Hands the frame back untouched when the queue is full.
    pub fn enqueue(&mut self, frame: T) -> std::result::Result<(), T> {
        if self.is_full() {
            return Err(frame);
        }

        let capacity = self.queue.capacity;
        let slots = &mut *self.slots;
        slots.buf[slots.rear] = Some(frame);
        slots.rear = (slots.rear + 1) % capacity;
        slots.size += 1;

        self.queue.not_empty.notify_one();
        Ok(())
    }

    /// Move the front frame out of the queue
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let capacity = self.queue.capacity;
        let slots = &mut *self.slots;
        let frame = slots.buf[slots.front].take();
        slots.front = (slots.front + 1) % capacity;
        slots.size -= 1;

        self.queue.not_full.notify_one();
        if slots.size == 0 {
            self.queue.empty.notify_all();
        }
        frame
    }

    /// Wait until a frame is available; false on timeout
    pub fn wait_not_empty(&mut self, timeout: Duration) -> bool {
        let queue = self.queue;
        self.wait_for(&queue.not_empty, timeout, |slots| slots.size > 0)
    }

    /// Wait until a slot is free; false on timeout
    pub fn wait_not_full(&mut self, timeout: Duration) -> bool {
        let queue = self.queue;
        let capacity = queue.capacity;
        self.wait_for(&queue.not_full, timeout, move |slots| slots.size < capacity)
    }

    /// Wait until the consumer has taken every frame; false on timeout
    pub fn wait_empty(&mut self, timeout: Duration) -> bool {
        let queue = self.queue;
        self.wait_for(&queue.empty, timeout, |slots| slots.size == 0)
    }

    fn wait_for<F>(&mut self, condvar: &Condvar, timeout: Duration, ready: F) -> bool
    where
        F: Fn(&Slots<T>) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while !ready(&*self.slots) {
            if condvar.wait_until(&mut self.slots, deadline).timed_out() {
                return ready(&*self.slots);
            }
        }
        true
    }
}
