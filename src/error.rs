use core::{alloc::Layout, fmt};

/// The error returned by [`Shared::try_new`][crate::Shared::try_new] and
/// [`Shared::try_from_box`][crate::Shared::try_from_box] when the control block
/// cannot be allocated.
///
/// By the time this error is returned the value handed to the constructor has
/// already been dropped, so nothing leaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    #[inline]
    pub(crate) fn new(layout: Layout) -> Self {
        AllocError { layout }
    }

    /// The layout of the allocation that failed.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory allocation of {} bytes for a control block failed",
            self.layout.size()
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllocError {}
