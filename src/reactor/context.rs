//! Thread-local access to the loop-owned tables.
//!
//! Each reactor thread installs a handle to its [`LoopState`] here for the
//! lifetime of its loop. Handle methods invoked *on* the loop thread reach
//! the tables directly through [`with_current`]; every other thread gets
//! `None` and must marshal its request as a high-priority callback instead.
//!
//! Keeping the tables reachable only through the owning thread's local slot
//! makes the single-writer invariant mechanical: there is no lock to misuse
//! from the outside.

use super::core::LoopState;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CURRENT_LOOP: RefCell<Option<Rc<RefCell<LoopState>>>> = const { RefCell::new(None) };
}

/// Installs the loop state for the calling thread.
pub(super) fn enter(state: Rc<RefCell<LoopState>>) {
    CURRENT_LOOP.with(|slot| {
        *slot.borrow_mut() = Some(state);
    });
}

/// Removes the loop state; the calling thread's loop is exiting.
pub(super) fn exit() {
    CURRENT_LOOP.with(|slot| {
        *slot.borrow_mut() = None;
    });
}

/// Runs `func` against the calling thread's loop state, if this thread runs
/// a reactor loop.
///
/// The state is re-borrowed for each call, so `func` must not re-enter
/// `with_current`; callbacks that need the tables are invoked by the loop
/// with all borrows released.
pub(super) fn with_current<T>(func: impl FnOnce(&mut LoopState) -> T) -> Option<T> {
    let state = CURRENT_LOOP.with(|slot| slot.borrow().clone())?;
    let mut state = state.borrow_mut();
    Some(func(&mut state))
}
