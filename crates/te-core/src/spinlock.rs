//! Ticket spinlock for agent state
//!
//! The command agent's FIFOs and cursor are touched both from submitters
//! and from the watermark interrupt path, so the lock must never sleep.
//! Tickets hand the lock out in arrival order; a burst of submitters
//! cannot starve the interrupt path.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

/// A FIFO-fair spinlock guarding a `T`
pub struct SpinLock<T> {
    next: AtomicU32,
    owner: AtomicU32,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by the ticket protocol
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        SpinLock {
            next: AtomicU32::new(0),
            owner: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Take a ticket and spin until it is served
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        loop {
            let serving = self.owner.load(Ordering::Acquire);
            if serving == ticket {
                return SpinLockGuard { lock: self };
            }
            // Back off proportionally to our distance in the queue
            let dist = ticket.wrapping_sub(serving).min(32);
            for _ in 0..dist {
                core::hint::spin_loop();
            }
        }
    }

    /// Acquire only if nobody holds or waits for the lock
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let serving = self.owner.load(Ordering::Acquire);
        self.next
            .compare_exchange(
                serving,
                serving.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// True while held or contended
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.next.load(Ordering::Relaxed) != self.owner.load(Ordering::Relaxed)
    }

    /// Mutable access through exclusive ownership (no locking needed)
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

/// Releases the lock (serves the next ticket) on drop
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: we hold the current ticket
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we hold the current ticket
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.owner.fetch_add(1, Ordering::Release);
    }
}
