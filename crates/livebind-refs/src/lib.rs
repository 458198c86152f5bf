//! Reference extraction for livebind.
//!
//! A document read from a remote source may contain [`DocumentRef`] values
//! that point at other documents. Before such a document is written into a
//! reactive cell, each reference is replaced by its address and recorded in a
//! flat [`ReferenceMap`] keyed by its dotted path, so the caller can fetch the
//! referenced documents separately.
//!
//! When a referenced document has already been fetched, the value the caller
//! put in its place survives later extractions. Without that, every update
//! of the outer document would flip the resolved sub-document back to a bare
//! address until it is fetched again.
//!
//! [`DocumentRef`]: livebind_types::DocumentRef

pub mod extract;

pub use extract::{extract_refs, Extracted, ReferenceMap, ResolvedRefs};
