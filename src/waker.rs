//! A `Waker` that does nothing when woken.
//!
//! Handler futures are not driven by a real async reactor: the event loop
//! itself decides when to re-poll a suspended handler (on the next
//! readable-readiness event for that connection, per spec.md §4.4/§4.6).
//! `Waker::wake` is therefore never actually needed to schedule anything —
//! this vtable exists only because `Future::poll` requires *a* `Context`
//! to poll with.

use std::task::{RawWaker, RawWakerVTable, Waker};

fn clone(_: *const ()) -> RawWaker {
    RawWaker::new(std::ptr::null(), &VTABLE)
}
fn noop(_: *const ()) {}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);

pub(crate) fn noop_waker() -> Waker {
    // SAFETY: every vtable function is a no-op; the data pointer is never
    // dereferenced.
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}
