use {
    crate::{
        Shared,
        control_block::ControlBlock,
        count::{Atomic, Count, Local},
    },
    std::{fmt, marker::PhantomData, mem::{swap, take}, ptr::{self, NonNull}},
};

/// Thread-safe weak handle.
pub type SyncWeak<T> = Weak<T, Atomic>;

/// Non-owning observer of a [`Shared`] payload.
///
/// A weak handle keeps the control block alive, but not the payload.
/// It cannot be dereferenced; [`lock`][`Self::lock`] promotes it
/// to a shared handle, which fails once the payload is gone.
pub struct Weak<T, C = Local>
    where C: Count
{
    // Address of the payload when the handle was created.
    // Dangles once the payload is destroyed; never dereferenced.
    ptr: Option<NonNull<T>>,

    // INVARIANT: If Some, self owns one weak reference to block.
    block: Option<NonNull<ControlBlock<T, C>>>,

    phantom: PhantomData<ControlBlock<T, C>>,
}

// SAFETY: Same as for Shared<T, Atomic>; a weak handle
//         can be promoted to a strong one on any thread.
unsafe impl<T> Send for Weak<T, Atomic> where T: Send + Sync { }
unsafe impl<T> Sync for Weak<T, Atomic> where T: Send + Sync { }

impl<T, C> Weak<T, C>
    where C: Count
{
    /// Create a weak handle that observes nothing.
    ///
    /// It is always expired.
    pub const fn new() -> Self
    {
        Self{ptr: None, block: None, phantom: PhantomData}
    }

    /// The control block, if any.
    pub (crate) fn block(&self) -> Option<NonNull<ControlBlock<T, C>>>
    {
        self.block
    }

    /// Whether the observed payload is gone.
    ///
    /// Empty weak handles are always expired.
    pub fn expired(&self) -> bool
    {
        self.use_count() == 0
    }

    /// The number of strong owners of the observed payload.
    pub fn use_count(&self) -> usize
    {
        // SAFETY: We own a weak reference, so the block is live.
        self.block.map_or(0, |block| unsafe { block.as_ref().strong_count() })
    }

    /// The number of weak observers, including this one.
    pub fn weak_count(&self) -> usize
    {
        // SAFETY: We own a weak reference, so the block is live.
        self.block.map_or(0, |block| unsafe { block.as_ref().weak_count() })
    }

    /// Attempt to promote to a shared handle.
    ///
    /// The result is non-empty iff the payload was alive at the moment
    /// of the call, in which case it keeps the payload alive.
    pub fn lock(&self) -> Shared<T, C>
    {
        Shared::from_weak(self)
    }

    /// The address the payload had, or null if empty.
    ///
    /// The pointer may dangle and must not be dereferenced.
    pub fn as_ptr(&self) -> *const T
    {
        self.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr())
    }

    /// Whether both handles observe the same control block.
    pub fn ptr_eq(&self, other: &Self) -> bool
    {
        self.block == other.block
    }

    /// Observe the payload of `shared` instead.
    pub fn assign(&mut self, shared: &Shared<T, C>)
    {
        if self.block == shared.block() {
            return;
        }
        *self = Self::from(shared);
    }

    /// Stop observing and become empty.
    pub fn reset(&mut self)
    {
        drop(self.take());
    }

    /// Exchange observed payloads with another handle.
    pub fn swap(&mut self, other: &mut Self)
    {
        swap(&mut self.ptr, &mut other.ptr);
        swap(&mut self.block, &mut other.block);
    }

    /// Move the observation into a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self
    {
        take(self)
    }
}

impl<T, C> Default for Weak<T, C>
    where C: Count
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<T, C> From<&Shared<T, C>> for Weak<T, C>
    where C: Count
{
    fn from(shared: &Shared<T, C>) -> Self
    {
        let Some(block) = shared.block()
            else { return Self::new() };
        // SAFETY: shared owns a strong reference, so the block is live.
        unsafe { block.as_ref().increment_weak(); }
        let ptr = NonNull::new(shared.as_ptr() as *mut T);
        Self{ptr, block: Some(block), phantom: PhantomData}
    }
}

impl<T, C> Clone for Weak<T, C>
    where C: Count
{
    fn clone(&self) -> Self
    {
        if let Some(block) = self.block {
            // SAFETY: We own a weak reference, so the block is live.
            unsafe { block.as_ref().increment_weak(); }
        }
        Self{ptr: self.ptr, block: self.block, phantom: PhantomData}
    }

    fn clone_from(&mut self, source: &Self)
    {
        if self.ptr_eq(source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T, C> Drop for Weak<T, C>
    where C: Count
{
    fn drop(&mut self)
    {
        self.ptr = None;
        if let Some(block) = self.block.take() {
            // SAFETY: We own a weak reference, given up here.
            unsafe { ControlBlock::release_weak(block); }
        }
    }
}

impl<T, C> fmt::Debug for Weak<T, C>
    where C: Count
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "(Weak)")
    }
}
