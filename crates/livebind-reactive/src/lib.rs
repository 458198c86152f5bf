//! Host reactive primitives for livebind.
//!
//! Bindings never talk to a UI framework directly. They need three things
//! from the host, and this crate provides a standalone version of each:
//!
//! - [`ReactiveCell`]: a mutable value that notifies observers on change
//! - [`Scope`]: an owning scope that runs cleanups when it is disposed and
//!   knows whether it executes during a server render
//! - [`OneShot`]: a result cell written at most once and awaited by any
//!   number of waiters
//!
//! A host framework can adapt its own primitives to these types; the rest of
//! livebind only depends on the contracts here.

pub mod cell;
pub mod oneshot;
pub mod scope;

pub use cell::{CellId, Holder, Observer, ReactiveCell};
pub use oneshot::OneShot;
pub use scope::{CleanupId, Scope, WeakScope};
