use {
    crate::{HandleError, HandleKind},
    std::{
        fmt,
        marker::PhantomData,
        mem::{swap, take},
        ops::{Deref, DerefMut},
        ptr::{NonNull, null_mut},
    },
};

/// Sole owner of a heap-allocated payload.
///
/// An exclusive handle is either empty or owns exactly one payload,
/// which it destroys when it is dropped or reset.
/// It cannot be cloned; ownership moves with the handle,
/// and [`take`][`Self::take`] moves it out while leaving an empty handle.
///
/// Dereferencing an empty handle panics.
/// Use [`get`][`Self::get`] or [`try_get`][`Self::try_get`]
/// where emptiness is expected.
pub struct Exclusive<T>
{
    // INVARIANT: Obtained from Box::leak and not aliased elsewhere.
    ptr: Option<NonNull<T>>,
    phantom: PhantomData<T>,
}

// SAFETY: Exclusive<T> owns its payload like Box<T> does.
unsafe impl<T> Send for Exclusive<T> where T: Send { }
unsafe impl<T> Sync for Exclusive<T> where T: Sync { }

impl<T> Exclusive<T>
{
    /// Create a handle that owns nothing.
    pub const fn empty() -> Self
    {
        Self{ptr: None, phantom: PhantomData}
    }

    /// Move `value` to the heap and own it.
    pub fn new(value: T) -> Self
    {
        Self::from_box(Box::new(value))
    }

    /// Take ownership of a boxed payload.
    pub fn from_box(payload: Box<T>) -> Self
    {
        Self{ptr: Some(NonNull::from(Box::leak(payload))), phantom: PhantomData}
    }

    /// Take ownership of a raw payload pointer.
    ///
    /// A null pointer yields an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`],
    /// and nothing else may use it afterwards.
    pub unsafe fn from_raw(ptr: *mut T) -> Self
    {
        Self{ptr: NonNull::new(ptr), phantom: PhantomData}
    }

    /// Whether the handle owns nothing.
    pub fn is_empty(&self) -> bool
    {
        self.ptr.is_none()
    }

    /// The address of the payload, or null if empty.
    pub fn as_ptr(&self) -> *mut T
    {
        self.ptr.map_or(null_mut(), NonNull::as_ptr)
    }

    /// The payload, or [`None`] if empty.
    pub fn get(&self) -> Option<&T>
    {
        // SAFETY: The payload is live and owned by self.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// The payload, mutably, or [`None`] if empty.
    pub fn get_mut(&mut self) -> Option<&mut T>
    {
        // SAFETY: The payload is live and owned by self, which is borrowed mutably.
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// The payload, or [`HandleError::NullDereference`] if empty.
    pub fn try_get(&self) -> Result<&T, HandleError>
    {
        self.get().ok_or(HandleError::NullDereference{kind: HandleKind::Exclusive})
    }

    /// Like [`try_get`][`Self::try_get`], but mutable.
    pub fn try_get_mut(&mut self) -> Result<&mut T, HandleError>
    {
        self.get_mut().ok_or(HandleError::NullDereference{kind: HandleKind::Exclusive})
    }

    /// Give up ownership without destroying the payload.
    ///
    /// The handle is empty afterwards.
    /// The caller becomes responsible for the returned payload.
    pub fn release(&mut self) -> Option<Box<T>>
    {
        // SAFETY: ptr came from Box::leak and is forgotten by self here.
        self.ptr.take().map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }

    /// Destroy the current payload, if any, and own `payload` instead.
    pub fn reset(&mut self, payload: Option<Box<T>>)
    {
        drop(self.release());
        if let Some(payload) = payload {
            self.ptr = Some(NonNull::from(Box::leak(payload)));
        }
    }

    /// Exchange payloads with another handle.
    pub fn swap(&mut self, other: &mut Self)
    {
        swap(&mut self.ptr, &mut other.ptr);
    }

    /// Move ownership into a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self
    {
        take(self)
    }

    /// Move the payload out of the heap.
    pub fn into_inner(mut self) -> Option<T>
    {
        self.release().map(|payload| *payload)
    }
}

impl<T> Default for Exclusive<T>
{
    fn default() -> Self
    {
        Self::empty()
    }
}

impl<T> From<Box<T>> for Exclusive<T>
{
    fn from(payload: Box<T>) -> Self
    {
        Self::from_box(payload)
    }
}

impl<T> From<Option<Box<T>>> for Exclusive<T>
{
    fn from(payload: Option<Box<T>>) -> Self
    {
        payload.map_or_else(Self::empty, Self::from_box)
    }
}

impl<T> Deref for Exclusive<T>
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

impl<T> DerefMut for Exclusive<T>
{
    fn deref_mut(&mut self) -> &mut T
    {
        match self.try_get_mut() {
            Ok(payload) => payload,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T> Drop for Exclusive<T>
{
    fn drop(&mut self)
    {
        drop(self.release());
    }
}

impl<T> fmt::Debug for Exclusive<T>
    where T: fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self.get() {
            Some(payload) => f.debug_tuple("Exclusive").field(payload).finish(),
            None          => f.write_str("Exclusive(<empty>)"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::testing::DropCounter};

    #[test]
    fn release_hands_payload_to_caller()
    {
        let mut u = Exclusive::new(9);
        let raw = Box::into_raw(u.release().unwrap());
        assert!(u.is_empty());
        assert!(u.as_ptr().is_null());
        drop(u);

        // SAFETY: raw came from Box::into_raw and was not freed by u.
        let payload = unsafe { Box::from_raw(raw) };
        assert_eq!(*payload, 9);
    }

    #[test]
    fn release_does_not_destroy()
    {
        let drops = DropCounter::new();
        let mut u = Exclusive::from_box(drops.boxed(1));
        let payload = u.release();
        drop(u);
        assert_eq!(drops.drops(), 0);
        drop(payload);
        assert_eq!(drops.drops(), 1);
    }

    #[test]
    fn reset_destroys_previous_payload()
    {
        let drops = DropCounter::new();
        let mut u = Exclusive::from_box(drops.boxed(1));
        u.reset(Some(drops.boxed(2)));
        assert_eq!(drops.drops(), 1);
        assert_eq!(u.value, 2);

        u.reset(None);
        assert_eq!(drops.drops(), 2);
        assert!(u.is_empty());
    }

    #[test]
    fn take_leaves_source_empty()
    {
        let drops = DropCounter::new();
        let mut a = Exclusive::from_box(drops.boxed(3));
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(b.value, 3);
        drop(a);
        assert_eq!(drops.drops(), 0);
        drop(b);
        assert_eq!(drops.drops(), 1);
    }

    #[test]
    fn swap_exchanges_payloads()
    {
        let mut a = Exclusive::new(1);
        let mut b = Exclusive::empty();
        a.swap(&mut b);
        assert!(a.is_empty());
        assert_eq!(*b, 1);
    }

    #[test]
    fn mutation_through_handle()
    {
        let mut u = Exclusive::new(String::from("own"));
        u.push_str("ed");
        *u.try_get_mut().unwrap() += "!";
        assert_eq!(u.into_inner().as_deref(), Some("owned!"));
    }

    #[test]
    fn empty_handle_reports_null_dereference()
    {
        let mut u = Exclusive::<i32>::default();
        let expected = HandleError::NullDereference{kind: HandleKind::Exclusive};
        assert_eq!(u.try_get(), Err(expected));
        assert_eq!(u.try_get_mut().err(), Some(expected));
        assert_eq!(format!("{u:?}"), "Exclusive(<empty>)");
    }

    #[test]
    #[should_panic(expected = "Dereference of empty exclusive handle")]
    fn deref_of_empty_handle_panics()
    {
        let u = Exclusive::<i32>::empty();
        let _value: i32 = *u;
    }

    #[test]
    fn from_raw_null_is_empty()
    {
        // SAFETY: Null is always accepted.
        let u = unsafe { Exclusive::<i32>::from_raw(null_mut()) };
        assert!(u.is_empty());

        let raw = Box::into_raw(Box::new(4));
        // SAFETY: raw came from Box::into_raw.
        let u = unsafe { Exclusive::from_raw(raw) };
        assert_eq!(u.as_ptr(), raw);
        assert_eq!(format!("{u:?}"), "Exclusive(4)");
    }
}
