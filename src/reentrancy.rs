//! Debug-only reentrancy detection for table entry points.
//!
//! Tables call into user code (`Hash`, `Eq`) while their links are being
//! rewritten. A user impl that reaches back into the same table at that
//! moment would observe half-spliced lists. In debug builds every public
//! entry point marks the table busy and a nested entry panics; in release
//! builds the tracker is a zero-sized no-op.

use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Tables are single-threaded; keep them !Send + !Sync.
    _single_thread: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _single_thread: PhantomData,
        }
    }

    /// Marks the owner busy until the returned section is dropped.
    #[inline]
    pub(crate) fn enter(&self) -> Section<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrancy detected: table entered from its own Hash/Eq callback"
            );
            return Section { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return Section { _owner: PhantomData };
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DebugReentrancy {
    // A clone starts idle regardless of the source's state.
    fn clone(&self) -> Self {
        Self::new()
    }
}

pub(crate) struct Section<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a ()>,
}

impl Drop for Section<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::DebugReentrancy;

    #[test]
    fn sequential_sections_are_fine() {
        let r = DebugReentrancy::new();
        drop(r.enter());
        drop(r.enter());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn nested_section_panics_in_debug() {
        let r = DebugReentrancy::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _outer = r.enter();
            let _inner = r.enter();
        }));
        assert!(res.is_err(), "expected nested entry to panic in debug builds");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn clone_of_busy_tracker_is_idle() {
        let r = DebugReentrancy::new();
        let _section = r.enter();
        let c = r.clone();
        drop(c.enter());
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn nested_section_is_noop_in_release() {
        let r = DebugReentrancy::new();
        let _outer = r.enter();
        let _inner = r.enter();
    }
}
