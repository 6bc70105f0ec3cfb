use crate::{count::SharedCount, error::AllocError, weak::Weak};
use alloc::{alloc::handle_alloc_error, boxed::Box};
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

/// A thread-safe shared-ownership pointer.
///
/// A [`Shared<T>`] pairs two things: the address it dereferences to, and a
/// strong reference to the control block that decides when the managed object
/// dies. Cloning a handle shares the control block and bumps its strong count.
/// When the last strong handle goes away the managed object is dropped,
/// exactly once, on whichever thread released it.
///
/// Usually the address is the managed object itself. The aliasing
/// constructors ([`Shared::map`], [`Shared::aliasing`], ...) build handles that
/// point somewhere else, typically a field, while the control block keeps the
/// whole object alive.
///
/// A handle can also be null. [`Shared::null`] and [`Default`] produce one that
/// owns nothing, and [`Shared::take`] and [`Shared::reset`] leave one behind.
/// Dereferencing a null handle panics; use [`Shared::get`] when the handle may
/// be null.
///
/// # Thread Safety
///
/// Handles can be cloned and dropped from any number of threads at once. Only
/// the lifetime of the object is synchronized, not access to it: pair the
/// handle with a `Mutex` or atomics for shared mutation. [`Shared<T>`] is
/// `Send` and `Sync` when `T` is.
///
/// # Cloning references
///
/// ```
/// use sharc::Shared;
///
/// let foo = Shared::new(vec![1.0, 2.0, 3.0]);
/// // The two syntaxes below are equivalent.
/// let a = foo.clone();
/// let b = Shared::clone(&foo);
/// assert_eq!(foo.use_count(), 3);
/// assert!(Shared::ptr_eq(&a, &b));
/// ```
///
/// # Cycles
///
/// Two objects that hold strong handles to each other are never dropped. Hold
/// one side of the cycle through a [`Weak<T>`] instead.
pub struct Shared<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    count: SharedCount,
    phantom: PhantomData<Box<T>>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Shared<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Shared<T> {}

#[cold]
#[inline(never)]
#[track_caller]
fn null_deref() -> ! {
    panic!("dereferenced a null Shared handle");
}

impl<T: ?Sized> Shared<T> {
    /// Constructs a null handle that owns nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let empty: Shared<u32> = Shared::null();
    /// assert!(empty.is_null());
    /// assert_eq!(empty.use_count(), 0);
    /// ```
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Shared {
            ptr: None,
            count: SharedCount::new(),
            phantom: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn from_parts(ptr: Option<NonNull<T>>, count: SharedCount) -> Self {
        Shared {
            ptr,
            count,
            phantom: PhantomData,
        }
    }

    /// Takes ownership of an individually boxed value. A separate control block
    /// is allocated to track it, and the box is freed when the last strong
    /// handle goes away.
    ///
    /// Unsized values work too, which makes this the way to build handles to
    /// trait objects and slices.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    /// use std::fmt::Display;
    ///
    /// let boxed: Box<dyn Display> = Box::new(42);
    /// let shown = Shared::from_box(boxed);
    /// assert_eq!(shown.to_string(), "42");
    /// ```
    #[inline]
    pub fn from_box(value: Box<T>) -> Self
    where
        T: 'static,
    {
        match Shared::try_from_box(value) {
            Ok(shared) => shared,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Fallible version of [`Shared::from_box`]. If the control block cannot
    /// be allocated the box is dropped and [`AllocError`] is returned.
    #[inline]
    pub fn try_from_box(value: Box<T>) -> Result<Self, AllocError>
    where
        T: 'static,
    {
        let (ptr, count) = SharedCount::try_from_box(value)?;
        Ok(Shared::from_parts(Some(ptr), count))
    }

    /// Takes ownership of a raw pointer produced by [`Box::into_raw`]. A null
    /// pointer yields a null handle.
    ///
    /// # Safety
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned
    /// by anything else.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let raw = Box::into_raw(Box::new(String::from("owned")));
    /// let shared = unsafe { Shared::from_raw(raw) };
    /// assert_eq!(*shared, "owned");
    ///
    /// let null: Shared<String> = unsafe { Shared::from_raw(std::ptr::null_mut()) };
    /// assert_eq!(null.use_count(), 0);
    /// ```
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self
    where
        T: 'static,
    {
        if ptr.is_null() {
            Shared::null()
        } else {
            Shared::from_box(Box::from_raw(ptr))
        }
    }

    /// Builds a handle that shares ownership with `source` but dereferences to
    /// `ptr`. The object managed by `source` stays alive as long as the new
    /// handle does. `ptr` may be null, giving a handle that owns but does not
    /// point.
    ///
    /// Prefer [`Shared::map`] when the target can be reached through a
    /// reference.
    ///
    /// # Safety
    /// A non-null `ptr` must stay valid for reads as long as the object managed
    /// by `source` is alive, typically by pointing into it. If the new handle
    /// is sent to another thread, the object managed by `source` must be safe
    /// to drop there.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let pair = Shared::new((1u8, 2u16));
    /// let second: Shared<u16> = unsafe { Shared::aliasing(&pair, &pair.1) };
    /// drop(pair);
    /// assert_eq!(*second, 2);
    /// ```
    #[inline]
    pub unsafe fn aliasing<U: ?Sized>(source: &Shared<U>, ptr: *const T) -> Self {
        Shared::from_parts(NonNull::new(ptr as *mut T), source.count.clone())
    }

    /// Builds a handle to a part of this handle's target, sharing ownership of
    /// the whole managed object. A null handle maps to a null handle that
    /// still shares the same control block.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let words = Shared::new(vec!["alpha", "beta"]);
    /// let first: Shared<str> = Shared::map(&words, |w| w[0]);
    /// assert_eq!(&*first, "alpha");
    /// assert_eq!(words.use_count(), 2);
    /// ```
    #[inline]
    pub fn map<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> &U,
    {
        Shared::from_parts(this.get().map(|value| NonNull::from(f(value))), this.count.clone())
    }

    /// Like [`Shared::map`], but consumes the handle so no counter is touched.
    /// This is also how a handle is converted to a trait object.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    /// use std::fmt::Debug;
    ///
    /// fn erase(n: &[i32; 3]) -> &(dyn Debug + Send + Sync + 'static) {
    ///     n
    /// }
    ///
    /// let numbers = Shared::new([1, 2, 3]);
    /// let erased: Shared<dyn Debug + Send + Sync> = Shared::map_into(numbers, erase);
    /// assert_eq!(format!("{:?}", erased), "[1, 2, 3]");
    /// assert_eq!(erased.use_count(), 1);
    /// ```
    #[inline]
    pub fn map_into<U: ?Sized, F>(mut this: Self, f: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> &U,
    {
        let count = mem::take(&mut this.count);
        Shared::from_parts(this.get().map(|value| NonNull::from(f(value))), count)
    }

    /// Like [`Shared::map`], but lets the projection fail. Returns [`None`]
    /// when this handle is null or `f` returns [`None`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let words = Shared::new(vec![String::from("only")]);
    /// assert!(Shared::filter_map(&words, |w| w.get(0)).is_some());
    /// assert!(Shared::filter_map(&words, |w| w.get(1)).is_none());
    /// assert_eq!(words.use_count(), 1);
    /// ```
    pub fn filter_map<U: ?Sized, F>(this: &Self, f: F) -> Option<Shared<U>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> Option<&U>,
    {
        let target = f(this.get()?)?;
        Some(Shared::from_parts(Some(NonNull::from(target)), this.count.clone()))
    }

    /// Creates a [`Weak`] observer of the object this handle manages.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    /// assert_eq!(five.weak_count(), 1);
    /// assert_eq!(*weak_five.upgrade().unwrap(), 5);
    /// ```
    #[inline]
    #[must_use]
    pub fn downgrade(this: &Self) -> Weak<T> {
        Weak::from_parts(this.ptr, this.count.downgrade())
    }

    /// Returns a reference to the target, or [`None`] for a null handle.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the target outlives every strong reference we hold
        self.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Returns the target address without affecting ownership.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Returns `true` when this handle has no target. A handle built by
    /// [`Shared::aliasing`] from a null pointer is null but still owns.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Gets the number of strong handles sharing this control block, or 0 for
    /// a handle that owns nothing. Be careful as another thread can change the
    /// count at any time, so a result of 1 does not mean exclusive access.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let five = Shared::new(5);
    /// let _also_five = Shared::clone(&five);
    ///
    /// // This assertion is deterministic because we haven't shared
    /// // the handle between threads.
    /// assert_eq!(2, five.use_count());
    /// ```
    #[inline]
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.count.use_count()
    }

    /// Gets the number of [`Weak`] handles observing this control block. The
    /// same caveats as [`Shared::use_count`] apply.
    #[inline]
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.count.weak_count()
    }

    /// Returns `true` when [`Shared::use_count`] is 1.
    #[inline]
    #[must_use]
    pub fn unique(&self) -> bool {
        self.count.unique()
    }

    /// Compares whether two handles dereference to the same address, similar
    /// to [`ptr::eq`]. Two null handles are equal.
    ///
    /// [`ptr::eq`]: core::ptr::eq "ptr::eq"
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.addr() == other.addr()
    }

    /// Compares whether two handles share a control block, whatever they
    /// point at.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let pair = Shared::new((1, 2));
    /// let first = Shared::map(&pair, |p| &p.0);
    /// assert!(Shared::owner_eq(&pair, &first));
    /// assert!(!Shared::owner_eq(&pair, &Shared::new((1, 2))));
    /// ```
    #[inline]
    #[must_use]
    pub fn owner_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        this.count == other.count
    }

    /// Releases this handle's ownership and leaves it null.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let mut a = Shared::new(1);
    /// let b = a.clone();
    /// a.reset();
    /// assert_eq!(a.use_count(), 0);
    /// assert_eq!(b.use_count(), 1);
    /// ```
    #[inline]
    pub fn reset(&mut self) {
        Shared::<T>::null().swap(self);
    }

    /// Replaces this handle's ownership with a freshly boxed value.
    #[inline]
    pub fn reset_with(&mut self, value: Box<T>)
    where
        T: 'static,
    {
        Shared::from_box(value).swap(self);
    }

    /// Replaces this handle's ownership with a raw pointer, as
    /// [`Shared::from_raw`] would take it. A null pointer leaves the handle
    /// null.
    ///
    /// Passing the pointer this handle already holds would give the object two
    /// control blocks; debug builds assert against it.
    ///
    /// # Safety
    /// The same requirements as [`Shared::from_raw`].
    #[inline]
    pub unsafe fn reset_raw(&mut self, ptr: *mut T)
    where
        T: 'static,
    {
        debug_assert!(
            !self.targets(ptr),
            "reset with the pointer this handle already holds"
        );
        Shared::from_raw(ptr).swap(self);
    }

    /// Moves this handle out, leaving a null handle in its place. The counters
    /// are not touched.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let mut a = Shared::new(1);
    /// let b = a.take();
    /// assert!(a.is_null());
    /// assert_eq!(b.use_count(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Exchanges target and ownership with `other`. The counters are not
    /// touched.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        self.count.swap(&mut other.count);
    }

    #[inline(always)]
    fn addr(&self) -> *const () {
        self.ptr
            .map_or(ptr::null(), |ptr| ptr.as_ptr() as *const ())
    }

    // Zero-sized targets all share one dangling address, so they never count.
    fn targets(&self, ptr: *const T) -> bool {
        match self.get() {
            Some(current) => {
                !ptr.is_null()
                    && mem::size_of_val(current) != 0
                    && ptr as *const () == self.addr()
            }
            None => false,
        }
    }
}

impl<T: 'static> Shared<T> {
    /// Constructs a new [`Shared<T>`]. The value and its control block share a
    /// single allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let tada = Shared::new("Tada!".to_string());
    /// assert_eq!(tada.use_count(), 1);
    /// ```
    #[inline]
    pub fn new(value: T) -> Shared<T> {
        match Shared::try_new(value) {
            Ok(shared) => shared,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Fallible version of [`Shared::new`]. If the allocation fails, `value` is
    /// dropped and [`AllocError`] is returned.
    #[inline]
    pub fn try_new(value: T) -> Result<Shared<T>, AllocError> {
        let (ptr, count) = SharedCount::try_inline(value)?;
        Ok(Shared::from_parts(Some(ptr), count))
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    #[inline(always)]
    #[track_caller]
    fn deref(&self) -> &T {
        match self.ptr {
            // SAFETY: the target outlives every strong reference we hold
            Some(ptr) => unsafe { ptr.as_ref() },
            None => null_deref(),
        }
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        Shared::from_parts(self.ptr, self.count.clone())
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        self.count.clone_from(&source.count);
        self.ptr = source.ptr;
    }
}

impl<T: ?Sized> Default for Shared<T> {
    #[inline]
    fn default() -> Shared<T> {
        Shared::null()
    }
}

impl<T: 'static> From<T> for Shared<T> {
    #[inline(always)]
    fn from(value: T) -> Self {
        Shared::new(value)
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for Shared<T> {
    #[inline(always)]
    fn from(value: Box<T>) -> Self {
        Shared::from_box(value)
    }
}

/// Handles compare by identity: equal when they dereference to the same
/// address.
impl<T: ?Sized> PartialEq for Shared<T> {
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        Shared::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialOrd for Shared<T> {
    #[inline]
    fn partial_cmp(&self, other: &Shared<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    #[inline]
    fn cmp(&self, other: &Shared<T>) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

impl<T: ?Sized> Unpin for Shared<T> {}
