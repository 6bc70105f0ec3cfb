use crate::{error::AllocError, ucount, AtomicCounter};
use alloc::{
    alloc::{alloc, Layout},
    boxed::Box,
};
use branches::unlikely;
use core::{
    cell::UnsafeCell,
    mem::ManuallyDrop,
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
};

// The barrier keeps both counters from ever wrapping around. An increment that
// lands inside the barrier is rolled back before panicking, and the gap is
// wide enough that every CPU core could overshoot concurrently without the
// counter reaching the wrap point, so other threads can keep using their own
// handles after the panicking thread unwinds.
#[cfg(target_pointer_width = "64")]
const BARRIER: ucount = 512;
#[cfg(not(target_pointer_width = "64"))]
const BARRIER: ucount = 64;

/// The two counters of a control block.
///
/// `strong` counts the live strong handles. `weak` counts the live weak
/// handles plus one token held collectively by all strong handles, so it only
/// reaches zero once the strong side has disposed the object and let go.
pub(crate) struct Counts {
    strong: AtomicCounter,
    weak: AtomicCounter,
}

impl Counts {
    /// Creating a control block is itself the first strong reference.
    #[inline]
    pub(crate) fn new() -> Self {
        Counts {
            strong: AtomicCounter::new(1),
            weak: AtomicCounter::new(1),
        }
    }
}

/// A control block: the counters plus the knowledge of how to destroy the
/// managed object, erased behind a vtable.
pub(crate) trait Counter {
    fn counts(&self) -> &Counts;

    /// Destroys the managed object.
    ///
    /// # Safety
    /// Called exactly once, by whoever releases the last strong reference.
    unsafe fn dispose(&self);

    /// Frees the control block itself.
    ///
    /// # Safety
    /// Called exactly once, after `dispose`, by whoever releases the last weak
    /// token.
    unsafe fn destroy(self: Box<Self>) {
        drop(self);
    }
}

pub(crate) type CounterPtr = NonNull<dyn Counter>;

/// Control block for an object that was boxed on its own.
pub(crate) struct PtrCounter<T: ?Sized> {
    counts: Counts,
    ptr: NonNull<T>,
}

impl<T: ?Sized> PtrCounter<T> {
    #[inline]
    pub(crate) fn new(ptr: NonNull<T>) -> Self {
        PtrCounter {
            counts: Counts::new(),
            ptr,
        }
    }
}

impl<T: ?Sized> Counter for PtrCounter<T> {
    #[inline(always)]
    fn counts(&self) -> &Counts {
        &self.counts
    }

    unsafe fn dispose(&self) {
        // SAFETY: ptr came from `Box::leak` and is released only here
        drop(Box::from_raw(self.ptr.as_ptr()));
    }
}

/// Control block that stores the object inline, so the object and its counters
/// share one allocation. The object is dropped in place by `dispose` and its
/// storage goes away with the block in `destroy`.
pub(crate) struct InlineCounter<T> {
    counts: Counts,
    value: UnsafeCell<ManuallyDrop<T>>,
}

impl<T> InlineCounter<T> {
    #[inline]
    pub(crate) fn new(value: T) -> Self {
        InlineCounter {
            counts: Counts::new(),
            value: UnsafeCell::new(ManuallyDrop::new(value)),
        }
    }

    /// # Safety
    /// `this` must point to an initialized `InlineCounter`.
    #[inline]
    pub(crate) unsafe fn value_ptr(this: NonNull<Self>) -> NonNull<T> {
        // ManuallyDrop is transparent over T
        NonNull::new_unchecked((*this.as_ptr()).value.get() as *mut T)
    }
}

impl<T> Counter for InlineCounter<T> {
    #[inline(always)]
    fn counts(&self) -> &Counts {
        &self.counts
    }

    unsafe fn dispose(&self) {
        ManuallyDrop::drop(&mut *self.value.get());
    }
}

/// Reserves uninitialized storage for a control block, reporting failure
/// instead of aborting. The storage is compatible with `Box<C>`.
pub(crate) fn try_allocate<C>() -> Result<NonNull<C>, AllocError> {
    let layout = Layout::new::<C>();
    // SAFETY: every counter embeds `Counts`, so the layout is never zero-sized
    let raw = unsafe { alloc(layout) } as *mut C;
    NonNull::new(raw).ok_or_else(|| {
        log::warn!(
            "failed to allocate a {} byte control block",
            layout.size()
        );
        AllocError::new(layout)
    })
}

#[inline(always)]
fn thin(this: CounterPtr) -> *const () {
    this.as_ptr() as *const ()
}

/// Adds a strong reference.
///
/// # Safety
/// The caller must already hold a strong reference to `this`.
#[inline]
pub(crate) unsafe fn add_strong(this: CounterPtr) {
    let count = this.as_ref().counts().strong.fetch_add(1, Ordering::Relaxed);
    if unlikely(count >= ucount::MAX - BARRIER) {
        // give back the reference this call will not hand out. Kept out of line
        // to keep clones cheap to inline.
        release_strong_and_panic(this);
    }
}

#[cold]
#[inline(never)]
unsafe fn release_strong_and_panic(this: CounterPtr) -> ! {
    log::error!("strong counter of control block {:p} overflowed", thin(this));
    release_strong(this);
    panic!("reference counter overflow");
}

/// Adds a strong reference unless the object has already been disposed.
///
/// # Safety
/// The caller must hold a weak reference to `this`.
pub(crate) unsafe fn try_add_strong(this: CounterPtr) -> bool {
    let strong = &this.as_ref().counts().strong;
    let mut count = strong.load(Ordering::Relaxed);
    loop {
        if count == 0 {
            return false;
        }
        if unlikely(count >= ucount::MAX - BARRIER) {
            log::error!("strong counter of control block {:p} overflowed", thin(this));
            panic!("reference counter overflow");
        }
        match strong.compare_exchange_weak(count, count + 1, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => return true,
            Err(actual) => count = actual,
        }
    }
}

/// Drops a strong reference. The last one out disposes the object and then
/// gives up the strong side's weak token.
///
/// # Safety
/// The caller must hold a strong reference to `this` and must not use it
/// afterwards.
#[inline]
pub(crate) unsafe fn release_strong(this: CounterPtr) {
    if this.as_ref().counts().strong.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    // synchronizes with every earlier release so the object is not
    // disposed while another thread's writes through it are still in flight
    fence(Ordering::Acquire);
    log::trace!("disposing object managed by control block {:p}", thin(this));
    this.as_ref().dispose();
    release_weak(this);
}

/// Adds a weak reference.
///
/// # Safety
/// The caller must hold a strong or weak reference to `this`.
#[inline]
pub(crate) unsafe fn add_weak(this: CounterPtr) {
    let count = this.as_ref().counts().weak.fetch_add(1, Ordering::Relaxed);
    if unlikely(count >= ucount::MAX - BARRIER) {
        release_weak_and_panic(this);
    }
}

#[cold]
#[inline(never)]
unsafe fn release_weak_and_panic(this: CounterPtr) -> ! {
    log::error!("weak counter of control block {:p} overflowed", thin(this));
    release_weak(this);
    panic!("reference counter overflow");
}

/// Drops a weak reference, freeing the control block on the last one.
///
/// # Safety
/// The caller must hold a weak reference (or the strong side's token) to
/// `this` and must not use it afterwards.
#[inline]
pub(crate) unsafe fn release_weak(this: CounterPtr) {
    if this.as_ref().counts().weak.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    log::trace!("destroying control block {:p}", thin(this));
    Box::from_raw(this.as_ptr()).destroy();
}

/// A point-in-time snapshot of the strong count.
///
/// # Safety
/// The caller must hold a strong or weak reference to `this`.
#[inline]
pub(crate) unsafe fn strong_count(this: CounterPtr) -> usize {
    this.as_ref().counts().strong.load(Ordering::Acquire) as usize
}

/// A point-in-time snapshot of the raw weak count, strong-side token included.
///
/// # Safety
/// The caller must hold a strong or weak reference to `this`.
#[inline]
pub(crate) unsafe fn weak_count(this: CounterPtr) -> usize {
    this.as_ref().counts().weak.load(Ordering::Acquire) as usize
}
