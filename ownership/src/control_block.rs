use {
    crate::count::{Count, LOCKED},
    log::trace,
    scope_exit::ScopeExit,
    std::{cell::UnsafeCell, marker::PhantomData, ptr::NonNull},
};

/// Shared bookkeeping for one payload.
///
/// Every [`Shared`] and [`Weak`] handle for a payload
/// points to the same control block.
/// The control block owns the payload and two counters.
///
/// The weak counter holds one extra reference on behalf of
/// all strong owners together, for as long as there are any.
/// This way the last handle to go away is decided by
/// a single transition of the weak counter to zero,
/// even when the counters are updated from different threads.
/// [`weak_count`][`Self::weak_count`] hides the extra reference.
///
/// [`Shared`]: `crate::Shared`
/// [`Weak`]: `crate::Weak`
pub struct ControlBlock<T, C>
{
    strong: C,
    weak: C,

    // INVARIANT: Some while strong is non-zero, None afterwards.
    // INVARIANT: Only written by the caller that drove strong to zero.
    payload: UnsafeCell<Option<NonNull<T>>>,

    phantom: PhantomData<T>,
}

impl<T, C> ControlBlock<T, C>
    where C: Count
{
    /// Allocate a control block that owns `payload`.
    ///
    /// The new block has one strong owner and no weak observers;
    /// the caller becomes that strong owner.
    pub fn allocate(payload: Box<T>) -> NonNull<Self>
    {
        let payload = NonNull::from(Box::leak(payload));
        let block = Box::new(Self{
            strong: C::new(1),
            weak: C::new(1),
            payload: UnsafeCell::new(Some(payload)),
            phantom: PhantomData,
        });
        let block = NonNull::from(Box::leak(block));
        trace!("Allocated control block {:p}", block);
        block
    }

    /// The number of strong owners.
    pub fn strong_count(&self) -> usize
    {
        self.strong.load()
    }

    /// The number of weak observers.
    pub fn weak_count(&self) -> usize
    {
        let strong = self.strong.load();
        let weak = self.weak.load();
        // Locked only by is_unique, which requires no observers.
        if weak == LOCKED {
            return 0;
        }
        weak.saturating_sub(if strong == 0 { 0 } else { 1 })
    }

    /// Whether the payload is due for destruction.
    pub fn should_destroy_payload(&self) -> bool
    {
        self.strong.load() == 0
    }

    /// Whether the control block itself is due for reclamation.
    pub fn should_reclaim_block(&self) -> bool
    {
        self.should_destroy_payload() && self.weak.load() == 0
    }

    /// Whether the caller is the only handle of any kind.
    ///
    /// The caller must be a strong owner,
    /// and must not create other handles while this runs.
    pub fn is_unique(&self) -> bool
    {
        // Reading the two counters separately would race with
        // another thread promoting a weak handle and dropping it.
        // Locking the weak counter at one blocks new weak handles,
        // and without weak handles no new strong owner can appear.
        if !self.weak.lock_if_one() {
            return false;
        }
        let unique = self.strong.load() == 1;
        self.weak.unlock();
        unique
    }

    pub fn increment_strong(&self)
    {
        self.strong.increment();
    }

    /// Become a strong owner, unless the payload is already gone.
    pub fn try_increment_strong(&self) -> bool
    {
        self.strong.increment_if_nonzero()
    }

    /// Returns true if this was the last strong owner.
    pub fn decrement_strong(&self) -> bool
    {
        self.strong.decrement()
    }

    /// Waits while [`is_unique`][`Self::is_unique`] holds the weak counter.
    pub fn increment_weak(&self)
    {
        self.weak.increment_when_unlocked();
    }

    /// Returns true if the control block must now be reclaimed.
    pub fn decrement_weak(&self) -> bool
    {
        self.weak.decrement()
    }

    /// The address of the payload.
    ///
    /// # Safety
    ///
    /// The caller must be a strong owner.
    pub unsafe fn payload(&self) -> NonNull<T>
    {
        let payload = *self.payload.get();
        debug_assert!(payload.is_some(), "Payload read after destruction");
        // SAFETY: Strong owners exist, so the payload does too.
        payload.unwrap_unchecked()
    }

    /// Destroy the payload.
    ///
    /// # Safety
    ///
    /// The caller must have performed the transition of
    /// the strong counter to zero, and must call this at most once.
    pub unsafe fn destroy_payload(&self)
    {
        debug_assert!(self.should_destroy_payload());
        // Unlink the payload before running its destructor,
        // so that the block never points to a dropped value.
        if let Some(payload) = (*self.payload.get()).take() {
            trace!("Destroying payload {:p}", payload);
            drop(Box::from_raw(payload.as_ptr()));
        }
    }

    /// Give up one strong reference.
    ///
    /// Destroys the payload if this was the last strong owner,
    /// and reclaims the block if there are also no weak observers.
    ///
    /// # Safety
    ///
    /// `this` must be live and the caller must own a strong reference,
    /// which is consumed by this call.
    pub unsafe fn release_strong(this: NonNull<Self>)
    {
        if !this.as_ref().decrement_strong() {
            return;
        }

        // Strong owners share one weak reference. Give it up
        // even if the payload destructor below panics.
        let _release = ScopeExit::new(|| Self::release_weak(this));

        this.as_ref().destroy_payload();
    }

    /// Give up one weak reference.
    ///
    /// Reclaims the block if this was the last reference of any kind.
    ///
    /// # Safety
    ///
    /// `this` must be live and the caller must own a weak reference,
    /// which is consumed by this call.
    pub unsafe fn release_weak(this: NonNull<Self>)
    {
        if !this.as_ref().decrement_weak() {
            return;
        }
        debug_assert!(this.as_ref().should_reclaim_block());

        trace!("Reclaiming control block {:p}", this);
        drop(Box::from_raw(this.as_ptr()));
    }
}
