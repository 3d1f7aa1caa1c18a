//! Reactor: event loop and delayed-task scheduler.
//!
//! A reactor is one OS thread multiplexing readiness over registered file
//! descriptors plus its own wake pipe, and sweeping a deadline-ordered table
//! of delayed tasks. It is responsible for:
//! - dispatching descriptor readiness to registered callbacks,
//! - running callbacks submitted from other threads via [`Reactor::submit`],
//! - firing (and re-arming) delayed tasks.
//!
//! The registration table and the delayed-task table are owned by the loop
//! thread alone. Calls arriving from foreign threads are re-submitted as
//! high-priority callbacks that apply themselves on the owning thread, which
//! keeps both tables mechanically single-writer.

mod context;
mod core;
mod poller;

pub use self::core::{EventCallback, Reactor};
pub use self::poller::{Event, Interest};
