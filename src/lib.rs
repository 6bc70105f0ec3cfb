#![no_std]
//! # Sharc: shared ownership with weak observers and aliasing
//!
//! Sharc provides [`Shared<T>`], a thread-safe reference-counted pointer that
//! lets many owners share one heap object and destroys that object exactly
//! once, when the last owner lets go. Next to it sits [`Weak<T>`], an observer
//! that can tell whether the object is still alive without keeping it alive.
//!
//! ## How it works
//!
//! Every managed object has one control block holding two atomic counters:
//!
//! - the strong count, the number of live [`Shared`] handles, and
//! - the weak count, the number of live [`Weak`] handles plus one token held
//!   collectively by the strong side.
//!
//! When the strong count drops to zero the object is disposed, then the
//! strong side gives up its weak token. Whoever brings the weak count to zero
//! frees the control block. The control block erases the concrete type of the
//! object, so one block can drop anything.
//!
//! A handle stores its dereference target separately from its control block.
//! That is what makes aliasing possible: a `Shared<U>` can point at a field of
//! a `T` while keeping the whole `T` alive.
//!
//! ```
//! use sharc::Shared;
//!
//! struct Config {
//!     name: String,
//!     retries: u32,
//! }
//!
//! let config = Shared::new(Config { name: "primary".into(), retries: 3 });
//! let name: Shared<String> = Shared::map(&config, |c| &c.name);
//!
//! assert_eq!(config.use_count(), 2);
//! drop(config);
//! // `name` keeps the whole `Config` alive.
//! assert_eq!(*name, "primary");
//! assert_eq!(name.use_count(), 1);
//! ```
//!
//! ## Limitations
//!
//! - Strong cycles leak. There is no cycle collector; break cycles with
//!   [`Weak`].
//! - Counters are half a word wide on 64-bit systems, see below.
//!
//! ### Features
//!
//! By default, Sharc uses 32-bit counters on 64-bit systems and word-sized
//! counters elsewhere, with the `usize-for-small-platforms` feature enabled.
//! Disabling default features makes 32-bit platforms use 16-bit counters, and
//! is rejected at build time on narrower targets. The
//! `std` feature implements `std::error::Error` for [`AllocError`].

#![warn(missing_docs, missing_debug_implementations)]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[cfg(target_pointer_width = "64")]
pub(crate) use core::sync::atomic::AtomicU32 as AtomicCounter;

#[cfg(all(
    not(target_pointer_width = "64"),
    feature = "usize-for-small-platforms"
))]
pub(crate) use core::sync::atomic::AtomicUsize as AtomicCounter;

#[cfg(all(
    target_pointer_width = "32",
    not(feature = "usize-for-small-platforms")
))]
pub(crate) use core::sync::atomic::AtomicU16 as AtomicCounter;

#[cfg(target_pointer_width = "64")]
pub(crate) use u32 as ucount;

#[cfg(all(
    not(target_pointer_width = "64"),
    feature = "usize-for-small-platforms"
))]
pub(crate) use usize as ucount;

#[cfg(all(
    target_pointer_width = "32",
    not(feature = "usize-for-small-platforms")
))]
pub(crate) use u16 as ucount;

#[cfg(all(
    not(target_pointer_width = "64"),
    not(target_pointer_width = "32"),
    not(feature = "usize-for-small-platforms")
))]
compile_error!(
    "sharc needs the `usize-for-small-platforms` feature on targets narrower than 32 bits"
);

mod count;
mod counter;
mod error;
mod shared;
mod weak;

pub use error::AllocError;
pub use shared::Shared;
pub use weak::Weak;
