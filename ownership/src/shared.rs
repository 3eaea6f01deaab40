use {
    crate::{
        Exclusive,
        HandleError,
        HandleKind,
        Weak,
        control_block::ControlBlock,
        count::{Atomic, Count, Local},
    },
    log::debug,
    std::{
        fmt,
        marker::PhantomData,
        mem::{swap, take},
        ops::Deref,
        ptr::{self, NonNull},
    },
};

/// Thread-safe shared handle.
pub type SyncShared<T> = Shared<T, Atomic>;

/// Reference-counted owner of a heap-allocated payload.
///
/// Every clone of a shared handle is an equal owner of the payload.
/// The payload is destroyed when the last owner goes away,
/// regardless of how many [`Weak`] observers remain.
///
/// An empty handle owns nothing and has no control block.
/// Handles become empty by construction, [`take`][`Self::take`],
/// or [`reset`][`Self::reset`]; dereferencing one panics.
///
/// The counter flavor `C` decides whether handles may cross threads.
/// With the default [`Local`] counters they may not;
/// see [`SyncShared`] for the thread-safe flavor.
pub struct Shared<T, C = Local>
    where C: Count
{
    // INVARIANT: ptr and block are either both Some or both None.
    // INVARIANT: If Some, self owns one strong reference to block,
    //            and ptr equals the payload of block.
    ptr: Option<NonNull<T>>,
    block: Option<NonNull<ControlBlock<T, C>>>,
    phantom: PhantomData<ControlBlock<T, C>>,
}

// SAFETY: Atomic counters synchronize the control block,
//         and the payload is shared between threads like with Arc.
unsafe impl<T> Send for Shared<T, Atomic> where T: Send + Sync { }
unsafe impl<T> Sync for Shared<T, Atomic> where T: Send + Sync { }

impl<T, C> Shared<T, C>
    where C: Count
{
    /// Create a handle that owns nothing.
    pub const fn empty() -> Self
    {
        Self{ptr: None, block: None, phantom: PhantomData}
    }

    /// Move `value` to the heap and become its first owner.
    pub fn new(value: T) -> Self
    {
        Self::from_box(Box::new(value))
    }

    /// Take ownership of a boxed payload.
    ///
    /// This allocates a control block with one strong owner.
    pub fn from_box(payload: Box<T>) -> Self
    {
        let block = ControlBlock::allocate(payload);
        // SAFETY: We are the strong owner the block was created with.
        let ptr = unsafe { block.as_ref().payload() };
        Self{ptr: Some(ptr), block: Some(block), phantom: PhantomData}
    }

    /// Promote a weak handle.
    ///
    /// The result is empty if the weak handle has expired;
    /// an expired payload is never brought back.
    pub fn from_weak(weak: &Weak<T, C>) -> Self
    {
        let Some(block) = weak.block()
            else { return Self::empty() };

        // SAFETY: The weak handle keeps the block live.
        let block_ref = unsafe { block.as_ref() };

        // Checking and incrementing is one step, so that a concurrent
        // release cannot destroy the payload in between.
        if !block_ref.try_increment_strong() {
            debug!("Promotion of expired weak handle for {:p}", block);
            return Self::empty();
        }

        // SAFETY: We are now a strong owner.
        let ptr = unsafe { block_ref.payload() };
        Self{ptr: Some(ptr), block: Some(block), phantom: PhantomData}
    }

    /// Create a weak handle that observes this handle's payload.
    ///
    /// Downgrading an empty handle yields an empty weak handle.
    pub fn downgrade(&self) -> Weak<T, C>
    {
        Weak::from(self)
    }

    /// The control block, if any.
    pub (crate) fn block(&self) -> Option<NonNull<ControlBlock<T, C>>>
    {
        self.block
    }

    /// The number of strong owners, or zero if empty.
    pub fn use_count(&self) -> usize
    {
        // SAFETY: We own a strong reference, so the block is live.
        self.block.map_or(0, |block| unsafe { block.as_ref().strong_count() })
    }

    /// The number of weak observers, or zero if empty.
    pub fn weak_count(&self) -> usize
    {
        // SAFETY: We own a strong reference, so the block is live.
        self.block.map_or(0, |block| unsafe { block.as_ref().weak_count() })
    }

    /// Whether the handle owns nothing.
    pub fn is_empty(&self) -> bool
    {
        self.block.is_none()
    }

    /// The address of the payload, or null if empty.
    pub fn as_ptr(&self) -> *const T
    {
        self.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr())
    }

    /// Whether both handles share a control block.
    ///
    /// Two empty handles are considered equal.
    pub fn ptr_eq(&self, other: &Self) -> bool
    {
        self.block == other.block
    }

    /// The payload, or [`None`] if empty.
    pub fn get(&self) -> Option<&T>
    {
        // SAFETY: We own a strong reference, so the payload is live.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// The payload, or [`HandleError::NullDereference`] if empty.
    pub fn try_get(&self) -> Result<&T, HandleError>
    {
        self.get().ok_or(HandleError::NullDereference{kind: HandleKind::Shared})
    }

    /// Mutable access to the payload, if no other handle can see it.
    ///
    /// Returns [`None`] if the handle is empty,
    /// or if there are other owners or any weak observers.
    pub fn get_mut(&mut self) -> Option<&mut T>
    {
        let block = self.block?;
        // SAFETY: We own a strong reference, so the block is live.
        if !unsafe { block.as_ref().is_unique() } {
            return None;
        }
        // SAFETY: No other handle exists, and self is borrowed mutably.
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Detach from the current payload and own `payload` instead.
    ///
    /// Detaching gives up this handle's strong reference first,
    /// which may destroy the old payload and reclaim its control block.
    pub fn reset(&mut self, payload: Option<Box<T>>)
    {
        drop(self.take());
        *self = Self::from(payload);
    }

    /// Exchange payloads with another handle.
    pub fn swap(&mut self, other: &mut Self)
    {
        swap(&mut self.ptr, &mut other.ptr);
        swap(&mut self.block, &mut other.block);
    }

    /// Move ownership into a new handle, leaving this one empty.
    ///
    /// No counters change.
    pub fn take(&mut self) -> Self
    {
        take(self)
    }
}

impl<T, C> Default for Shared<T, C>
    where C: Count
{
    fn default() -> Self
    {
        Self::empty()
    }
}

impl<T, C> Clone for Shared<T, C>
    where C: Count
{
    fn clone(&self) -> Self
    {
        if let Some(block) = self.block {
            // SAFETY: We own a strong reference, so the block is live.
            unsafe { block.as_ref().increment_strong(); }
        }
        Self{ptr: self.ptr, block: self.block, phantom: PhantomData}
    }

    fn clone_from(&mut self, source: &Self)
    {
        // Re-attaching to the same block would change nothing.
        if self.ptr_eq(source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T, C> Drop for Shared<T, C>
    where C: Count
{
    fn drop(&mut self)
    {
        self.ptr = None;
        if let Some(block) = self.block.take() {
            // SAFETY: We own a strong reference, given up here.
            unsafe { ControlBlock::release_strong(block); }
        }
    }
}

impl<T, C> Deref for Shared<T, C>
    where C: Count
{
    type Target = T;

    fn deref(&self) -> &T
    {
        match self.try_get() {
            Ok(payload) => payload,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T, C> From<Box<T>> for Shared<T, C>
    where C: Count
{
    fn from(payload: Box<T>) -> Self
    {
        Self::from_box(payload)
    }
}

impl<T, C> From<Option<Box<T>>> for Shared<T, C>
    where C: Count
{
    fn from(payload: Option<Box<T>>) -> Self
    {
        payload.map_or_else(Self::empty, Self::from_box)
    }
}

impl<T, C> From<Exclusive<T>> for Shared<T, C>
    where C: Count
{
    fn from(mut exclusive: Exclusive<T>) -> Self
    {
        Self::from(exclusive.release())
    }
}

impl<T, C> TryFrom<&Weak<T, C>> for Shared<T, C>
    where C: Count
{
    type Error = HandleError;

    fn try_from(weak: &Weak<T, C>) -> Result<Self, HandleError>
    {
        let shared = Self::from_weak(weak);
        if shared.is_empty() {
            return Err(HandleError::Expired);
        }
        Ok(shared)
    }
}

impl<T, C> fmt::Debug for Shared<T, C>
    where T: fmt::Debug, C: Count
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self.get() {
            Some(payload) => f.debug_tuple("Shared").field(payload).finish(),
            None          => f.write_str("Shared(<empty>)"),
        }
    }
}
