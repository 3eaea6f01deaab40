//! Ownership-tracking handles.
//!
//! Three handle types express the three ways to hold a heap payload:
//!
//!  - [`Exclusive`] is the sole owner of its payload.
//!  - [`Shared`] is one of several reference-counted owners.
//!  - [`Weak`] observes a shared payload without keeping it alive,
//!    and must be promoted to a [`Shared`] to reach the payload.
//!
//! Shared and weak handles for one payload meet in a control block,
//! which counts strong owners and weak observers.
//! The payload is destroyed exactly once, when the last strong owner
//! goes away; the control block is reclaimed when the last handle
//! of either kind goes away.
//!
//! Handles are single-threaded by default.
//! [`SyncShared`] and [`SyncWeak`] use atomic counters instead,
//! and may be sent and shared across threads.

#![warn(missing_docs)]

pub use self::{
    count::{Atomic, Count, LOCKED, Local, MAX_COUNT},
    error::*,
    exclusive::*,
    shared::*,
    weak::*,
};

pub mod count;

mod control_block;
mod error;
mod exclusive;
mod shared;
mod weak;

#[cfg(test)]
mod testing;
