//! Remote source capability for livebind.
//!
//! livebind does not implement a remote store or its wire protocol. It
//! consumes a source through the [`RemoteSource`] trait: subscribe for value
//! snapshots, subscribe for ordered-child structural events, and cancel a
//! subscription through its [`Subscription`] handle.
//!
//! # Modules
//!
//! - [`error`]: [`SourceError`], reported by a source to its listeners
//! - [`traits`]: [`RemoteSource`], [`ChildEvent`] and the callback types
//! - [`subscription`]: the idempotent [`Subscription`] handle
//! - [`memory`]: [`MemorySource`], an in-memory source with an explicit
//!   dispatch queue, for embedding and tests

pub mod error;
pub mod memory;
pub mod subscription;
pub mod traits;

pub use error::{SourceError, SourceResult};
pub use memory::MemorySource;
pub use subscription::Subscription;
pub use traits::{ChildEvent, ChildFn, ErrorFn, RemoteSource, SnapshotFn};
