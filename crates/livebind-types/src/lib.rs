//! Foundation types for livebind.
//!
//! This crate provides the data model shared by every other livebind crate:
//! the document tree that flows from a remote source into a reactive cell,
//! the addresses of remote sources, and the identities used to partition
//! process-wide state.
//!
//! # Key Types
//!
//! - [`Value`]: Document tree: scalars, temporal/geo leaves, references, arrays, records
//! - [`Record`]: Keyed fields plus out-of-band [`Meta`] (the source `id`)
//! - [`DocumentRef`]: Pointer to another remote document inside a tree
//! - [`SourceRef`]: Address of a remote value or ordered collection
//! - [`Snapshot`]: Point-in-time payload delivered by a source
//! - [`AppId`]: Opaque host-app identity derived from configuration material
//! - [`BindingId`]: UUID v7 identifier for a live binding

pub mod error;
pub mod identity;
pub mod scalar;
pub mod snapshot;
pub mod source;
pub mod value;

pub use error::TypeError;
pub use identity::{AppId, BindingId};
pub use scalar::{GeoPoint, Timestamp};
pub use snapshot::Snapshot;
pub use source::{join_path, Backend, Partition, SourceKind, SourceRef};
pub use value::{DocumentRef, Meta, Record, Value};
