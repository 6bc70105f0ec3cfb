use crate::{
    counter::{self, CounterPtr, InlineCounter, PtrCounter},
    error::AllocError,
};
use alloc::boxed::Box;
use core::{mem, ptr::NonNull};

#[inline(always)]
fn addr(counter: Option<CounterPtr>) -> *const () {
    counter.map_or(core::ptr::null(), |c| c.as_ptr() as *const ())
}

/// A strong reference to at most one control block.
///
/// Cloning shares the block and bumps its strong count, dropping releases it.
/// Moving or swapping never touches the counters.
pub(crate) struct SharedCount {
    counter: Option<CounterPtr>,
}

impl SharedCount {
    #[inline]
    pub(crate) const fn new() -> Self {
        SharedCount { counter: None }
    }

    /// Wraps an individually boxed object in a fresh control block. If the block
    /// cannot be allocated the box is dropped before the error is returned.
    pub(crate) fn try_from_box<T: ?Sized + 'static>(
        value: Box<T>,
    ) -> Result<(NonNull<T>, Self), AllocError> {
        let slot = match counter::try_allocate::<PtrCounter<T>>() {
            Ok(slot) => slot,
            Err(err) => {
                drop(value);
                return Err(err);
            }
        };
        let ptr = NonNull::from(Box::leak(value));
        // SAFETY: slot is freshly allocated storage for a PtrCounter<T>
        unsafe { slot.as_ptr().write(PtrCounter::new(ptr)) };
        let counter: CounterPtr = slot;
        Ok((
            ptr,
            SharedCount {
                counter: Some(counter),
            },
        ))
    }

    /// Moves `value` into a control block that stores it inline.
    pub(crate) fn try_inline<T: 'static>(value: T) -> Result<(NonNull<T>, Self), AllocError> {
        let slot = counter::try_allocate::<InlineCounter<T>>()?;
        // SAFETY: slot is freshly allocated storage for an InlineCounter<T>
        let ptr = unsafe {
            slot.as_ptr().write(InlineCounter::new(value));
            InlineCounter::value_ptr(slot)
        };
        let counter: CounterPtr = slot;
        Ok((
            ptr,
            SharedCount {
                counter: Some(counter),
            },
        ))
    }

    #[inline]
    pub(crate) fn use_count(&self) -> usize {
        match self.counter {
            // SAFETY: we hold a strong reference
            Some(c) => unsafe { counter::strong_count(c) },
            None => 0,
        }
    }

    /// Number of weak handles, without the strong side's token.
    #[inline]
    pub(crate) fn weak_count(&self) -> usize {
        match self.counter {
            // SAFETY: we hold a strong reference, so the token is still counted
            Some(c) => unsafe { counter::weak_count(c) }.saturating_sub(1),
            None => 0,
        }
    }

    #[inline]
    pub(crate) fn unique(&self) -> bool {
        self.use_count() == 1
    }

    #[inline]
    pub(crate) fn swap(&mut self, other: &mut SharedCount) {
        mem::swap(&mut self.counter, &mut other.counter);
    }

    pub(crate) fn downgrade(&self) -> WeakCount {
        if let Some(c) = self.counter {
            // SAFETY: we hold a strong reference
            unsafe { counter::add_weak(c) };
        }
        WeakCount {
            counter: self.counter,
        }
    }
}

impl Clone for SharedCount {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(c) = self.counter {
            // SAFETY: we hold a strong reference
            unsafe { counter::add_strong(c) };
        }
        SharedCount {
            counter: self.counter,
        }
    }

    /// Takes the new reference before letting go of the old one, and does
    /// nothing when both already share a block.
    fn clone_from(&mut self, source: &Self) {
        if *self == *source {
            return;
        }
        if let Some(c) = source.counter {
            // SAFETY: source holds a strong reference
            unsafe { counter::add_strong(c) };
        }
        if let Some(old) = mem::replace(&mut self.counter, source.counter) {
            // SAFETY: the reference we held on `old` is given up here
            unsafe { counter::release_strong(old) };
        }
    }
}

impl Drop for SharedCount {
    #[inline]
    fn drop(&mut self) {
        if let Some(c) = self.counter {
            // SAFETY: this handle owns one strong reference
            unsafe { counter::release_strong(c) };
        }
    }
}

impl Default for SharedCount {
    #[inline]
    fn default() -> Self {
        SharedCount::new()
    }
}

/// Identity comparison: equal when both refer to the same control block.
impl PartialEq for SharedCount {
    #[inline]
    fn eq(&self, other: &SharedCount) -> bool {
        addr(self.counter) == addr(other.counter)
    }
}

impl Eq for SharedCount {}

/// A weak reference to at most one control block. Keeps the block alive but
/// not the object it manages.
pub(crate) struct WeakCount {
    counter: Option<CounterPtr>,
}

impl WeakCount {
    #[inline]
    pub(crate) const fn new() -> Self {
        WeakCount { counter: None }
    }

    /// Takes a strong reference if the object has not been disposed yet.
    pub(crate) fn upgrade(&self) -> Option<SharedCount> {
        let c = self.counter?;
        // SAFETY: we hold a weak reference, so the block is alive
        if unsafe { counter::try_add_strong(c) } {
            Some(SharedCount { counter: Some(c) })
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn use_count(&self) -> usize {
        match self.counter {
            // SAFETY: we hold a weak reference
            Some(c) => unsafe { counter::strong_count(c) },
            None => 0,
        }
    }

    /// Number of weak handles, without the strong side's token while it is
    /// still held.
    pub(crate) fn weak_count(&self) -> usize {
        match self.counter {
            // SAFETY: we hold a weak reference
            Some(c) => unsafe {
                let weak = counter::weak_count(c);
                if counter::strong_count(c) > 0 {
                    weak.saturating_sub(1)
                } else {
                    weak
                }
            },
            None => 0,
        }
    }
}

impl Clone for WeakCount {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(c) = self.counter {
            // SAFETY: we hold a weak reference
            unsafe { counter::add_weak(c) };
        }
        WeakCount {
            counter: self.counter,
        }
    }
}

impl Drop for WeakCount {
    #[inline]
    fn drop(&mut self) {
        if let Some(c) = self.counter {
            // SAFETY: this handle owns one weak reference
            unsafe { counter::release_weak(c) };
        }
    }
}

impl Default for WeakCount {
    #[inline]
    fn default() -> Self {
        WeakCount::new()
    }
}

impl PartialEq for WeakCount {
    #[inline]
    fn eq(&self, other: &WeakCount) -> bool {
        addr(self.counter) == addr(other.counter)
    }
}

impl Eq for WeakCount {}
