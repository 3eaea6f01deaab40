//! Reference counters used by control blocks.
//!
//! A control block keeps two counters of the same flavor.
//! [`Local`] counters are plain cells and keep handles on one thread.
//! [`Atomic`] counters synchronize like [`std::sync::Arc`] does,
//! and are what make [`SyncShared`] and [`SyncWeak`] sendable.
//!
//! [`SyncShared`]: `crate::SyncShared`
//! [`SyncWeak`]: `crate::SyncWeak`

use std::{
    cell::Cell,
    hint::spin_loop,
    process::abort,
    sync::atomic::{AtomicUsize, Ordering::{Acquire, Relaxed, Release}, fence},
};

/// Counts above this value abort the process.
///
/// Leaking handles in a loop is the only way to get here,
/// and continuing would eventually wrap the counter to zero.
pub const MAX_COUNT: usize = isize::MAX as usize;

/// Value of a counter while it is locked by [`Count::lock_if_one`].
///
/// Above [`MAX_COUNT`], so never a real count.
pub const LOCKED: usize = usize::MAX;

/// Counter flavor for a control block.
///
/// # Safety
///
/// [`decrement`][`Self::decrement`] must return true exactly once
/// per transition to zero, and only for the caller that performed it.
/// With concurrent callers, that caller must observe every write
/// made by other callers before their decrements.
/// [`increment_if_nonzero`][`Self::increment_if_nonzero`]
/// must never move the counter away from zero.
/// While [`lock_if_one`][`Self::lock_if_one`] holds the counter,
/// [`increment_when_unlocked`][`Self::increment_when_unlocked`]
/// must not complete.
pub unsafe trait Count
{
    /// Create a counter with the given value.
    fn new(initial: usize) -> Self;

    /// The current value of the counter.
    fn load(&self) -> usize;

    /// Add one to the counter.
    fn increment(&self);

    /// Subtract one from the counter.
    ///
    /// Returns true if the counter is now zero.
    fn decrement(&self) -> bool;

    /// Add one to the counter, unless it is zero.
    ///
    /// Returns whether the counter was incremented.
    fn increment_if_nonzero(&self) -> bool;

    /// Replace a value of exactly one with [`LOCKED`].
    ///
    /// Returns whether the counter was locked.
    /// A locked counter must be restored with [`unlock`][`Self::unlock`].
    fn lock_if_one(&self) -> bool;

    /// Restore a counter locked by [`lock_if_one`][`Self::lock_if_one`].
    fn unlock(&self);

    /// Add one to the counter, waiting while it is locked.
    fn increment_when_unlocked(&self);
}

/* -------------------------------------------------------------------------- */
/*                                    Local                                   */
/* -------------------------------------------------------------------------- */

/// Single-threaded counter.
#[derive(Debug)]
pub struct Local
{
    count: Cell<usize>,
}

// SAFETY: Cell is not Sync, so there is only ever one caller at a time.
unsafe impl Count for Local
{
    fn new(initial: usize) -> Self
    {
        Self{count: Cell::new(initial)}
    }

    #[inline]
    fn load(&self) -> usize
    {
        self.count.get()
    }

    #[inline]
    fn increment(&self)
    {
        let count = self.count.get();
        if count >= MAX_COUNT {
            abort();
        }
        self.count.set(count + 1);
    }

    #[inline]
    fn decrement(&self) -> bool
    {
        let count = self.count.get();
        debug_assert!(count > 0, "Local counter underflow");
        self.count.set(count - 1);
        count == 1
    }

    #[inline]
    fn increment_if_nonzero(&self) -> bool
    {
        if self.count.get() == 0 {
            return false;
        }
        self.increment();
        true
    }

    fn lock_if_one(&self) -> bool
    {
        if self.count.get() != 1 {
            return false;
        }
        self.count.set(LOCKED);
        true
    }

    fn unlock(&self)
    {
        debug_assert_eq!(self.count.get(), LOCKED, "Local counter not locked");
        self.count.set(1);
    }

    #[inline]
    fn increment_when_unlocked(&self)
    {
        // Lock and unlock happen within one call on this thread,
        // so the lock is never observed here.
        debug_assert_ne!(self.count.get(), LOCKED, "Local counter locked");
        self.increment();
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Atomic                                   */
/* -------------------------------------------------------------------------- */

/// Thread-safe counter.
#[derive(Debug)]
pub struct Atomic
{
    count: AtomicUsize,
}

// SAFETY: fetch_sub hands out each transition to zero to one thread,
//         and the Release/Acquire pair orders the other threads' writes.
unsafe impl Count for Atomic
{
    fn new(initial: usize) -> Self
    {
        Self{count: AtomicUsize::new(initial)}
    }

    #[inline]
    fn load(&self) -> usize
    {
        self.count.load(Acquire)
    }

    #[inline]
    fn increment(&self)
    {
        // A new reference can only be created from an existing one,
        // so no ordering with other memory operations is needed.
        let old = self.count.fetch_add(1, Relaxed);
        if old >= MAX_COUNT {
            abort();
        }
    }

    #[inline]
    fn decrement(&self) -> bool
    {
        let old = self.count.fetch_sub(1, Release);
        debug_assert!(old > 0, "Atomic counter underflow");
        if old != 1 {
            return false;
        }
        fence(Acquire);
        true
    }

    #[inline]
    fn increment_if_nonzero(&self) -> bool
    {
        let mut current = self.count.load(Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            if current >= MAX_COUNT {
                abort();
            }
            match self.count.compare_exchange_weak(
                current, current + 1, Acquire, Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn lock_if_one(&self) -> bool
    {
        // Acquire pairs with the Release decrements of other handles,
        // so their writes are visible if the lock is taken.
        self.count.compare_exchange(1, LOCKED, Acquire, Relaxed).is_ok()
    }

    fn unlock(&self)
    {
        self.count.store(1, Release);
    }

    #[inline]
    fn increment_when_unlocked(&self)
    {
        let mut current = self.count.load(Relaxed);
        loop {
            if current == LOCKED {
                spin_loop();
                current = self.count.load(Relaxed);
                continue;
            }
            if current >= MAX_COUNT {
                abort();
            }
            match self.count.compare_exchange_weak(
                current, current + 1, Acquire, Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest, std::{thread, time::Duration}};

    fn balance<C: Count>()
    {
        let count = C::new(0);
        assert!(!count.increment_if_nonzero());
        assert_eq!(count.load(), 0);

        count.increment();
        count.increment();
        assert!(count.increment_if_nonzero());
        assert_eq!(count.load(), 3);

        assert!(!count.decrement());
        assert!(!count.decrement());
        assert!(count.decrement());
        assert!(!count.increment_if_nonzero());
    }

    fn locking<C: Count>()
    {
        let count = C::new(2);
        assert!(!count.lock_if_one());
        assert!(!count.decrement());
        assert!(count.lock_if_one());
        assert_eq!(count.load(), LOCKED);
        count.unlock();
        assert_eq!(count.load(), 1);
        count.increment_when_unlocked();
        assert_eq!(count.load(), 2);
    }

    #[test]
    fn local_locking()
    {
        locking::<Local>();
    }

    #[test]
    fn atomic_locking()
    {
        locking::<Atomic>();
    }

    #[test]
    fn atomic_increment_waits_for_unlock()
    {
        let count = Atomic::new(1);
        assert!(count.lock_if_one());
        thread::scope(|s| {
            let waiter = s.spawn(|| count.increment_when_unlocked());
            thread::sleep(Duration::from_millis(20));
            assert_eq!(count.load(), LOCKED);
            count.unlock();
            waiter.join().unwrap();
        });
        assert_eq!(count.load(), 2);
    }

    #[test]
    fn local_balance()
    {
        balance::<Local>();
    }

    #[test]
    fn atomic_balance()
    {
        balance::<Atomic>();
    }

    #[test]
    fn atomic_zero_transition_is_observed_once()
    {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1000;

        let count = Atomic::new(THREADS * PER_THREAD);
        let zeros = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0 .. THREADS {
                s.spawn(|| {
                    for _ in 0 .. PER_THREAD {
                        if count.decrement() {
                            zeros.fetch_add(1, Relaxed);
                        }
                    }
                });
            }
        });
        assert_eq!(count.load(), 0);
        assert_eq!(zeros.load(Relaxed), 1);
    }

    proptest!
    {
        #[test]
        fn local_decrement_reports_zero_exactly_at_zero(n in 1usize .. 200)
        {
            let count = Local::new(0);
            for _ in 0 .. n {
                count.increment();
            }
            for remaining in (0 .. n).rev() {
                assert_eq!(count.decrement(), remaining == 0);
                assert_eq!(count.load(), remaining);
            }
        }
    }
}
