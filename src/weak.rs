use crate::{count::WeakCount, shared::Shared};
use alloc::boxed::Box;
use core::{fmt, marker::PhantomData, ptr::NonNull};

/// A non-owning observer of an object managed by [`Shared<T>`].
///
/// A [`Weak<T>`] keeps the control block alive but not the object: it can
/// tell whether the object still exists and can try to [`upgrade`] into a
/// strong handle, but it never delays the object's destruction. Use it to
/// break reference cycles.
///
/// [`upgrade`]: Weak::upgrade
///
/// # Examples
///
/// ```
/// use sharc::Shared;
///
/// let strong = Shared::new(String::from("alive"));
/// let weak = Shared::downgrade(&strong);
/// assert!(!weak.expired());
///
/// drop(strong);
/// assert!(weak.expired());
/// assert!(weak.upgrade().is_none());
/// ```
pub struct Weak<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    count: WeakCount,
    phantom: PhantomData<Box<T>>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Weak<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
    /// Constructs a [`Weak<T>`] that observes nothing; upgrading it always
    /// fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Weak;
    ///
    /// let empty: Weak<i64> = Weak::new();
    /// assert!(empty.upgrade().is_none());
    /// assert!(empty.expired());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Weak<T> {
        Weak {
            ptr: None,
            count: WeakCount::new(),
            phantom: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn from_parts(ptr: Option<NonNull<T>>, count: WeakCount) -> Self {
        Weak {
            ptr,
            count,
            phantom: PhantomData,
        }
    }

    /// Attempts to take a strong handle to the observed object. Returns
    /// [`None`] once the object has been dropped; an object whose strong count
    /// reached zero is never brought back.
    ///
    /// The returned handle points where the handle this observer was created
    /// from pointed, so aliased handles stay aliased.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let count = self.count.upgrade()?;
        Some(Shared::from_parts(self.ptr, count))
    }

    /// Gets the number of strong handles to the observed object, 0 once it
    /// has been dropped or when nothing is observed.
    #[inline]
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.count.use_count()
    }

    /// Gets the number of [`Weak`] handles observing the same control block,
    /// this one included, or 0 when nothing is observed.
    #[inline]
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.count.weak_count()
    }

    /// Returns `true` when the observed object is gone. Like
    /// [`Shared::use_count`] this is only a snapshot: `false` does not promise
    /// that a later [`Weak::upgrade`] succeeds.
    #[inline]
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Compares whether two observers share a control block. Two empty
    /// observers are equal.
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.count == other.count
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        Weak::from_parts(self.ptr, self.count.clone())
    }
}

impl<T: ?Sized> Default for Weak<T> {
    #[inline]
    fn default() -> Weak<T> {
        Weak::new()
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}

impl<T: ?Sized> Unpin for Weak<T> {}
