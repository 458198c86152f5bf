//! Bind reactive cells to remote values and ordered collections.
//!
//! A binding subscribes to a [`SourceRef`](livebind_types::SourceRef) and
//! keeps a [`ReactiveCell`](livebind_reactive::ReactiveCell) in sync with it
//! until it is stopped or its scope is disposed.
//!
//! # Architecture
//!
//! - [`bind_as_object`] and [`bind_as_list`] are the controllers. Each
//!   returns an [`Unbind`] and reports through a [`Progress`].
//! - [`Binder`] is the facade. It claims targets, replays initial state,
//!   rebinds when a reactive source changes, and ties every binding to a
//!   [`Scope`](livebind_reactive::Scope).
//! - [`Serializer`] turns snapshots into values and [`Operations`] applies
//!   them to targets; both can be replaced per binding through
//!   [`BindOptions`].
//!
//! ```ignore
//! let binder = Binder::new(remote, state, Scope::new());
//! let todos = binder.list(SourceRef::keyed_list("/todos"), BindOptions::new());
//! todos.wait().await?;
//! ```

pub mod binding;
pub mod config;
pub mod control;
pub mod error;
pub mod list;
pub mod object;
pub mod ops;
pub mod serialize;

pub use binding::{Binder, Binding, SourceInput};
pub use config::{BindConfig, BindOptions, ResetMode, ResetPolicy};
pub use control::{Progress, Shape, Unbind};
pub use error::{BindError, BindResult};
pub use list::{bind_as_list, insertion_index};
pub use object::bind_as_object;
pub use ops::{DefaultOperations, Operations};
pub use serialize::{index_for_key, RecordSerializer, Serializer, PRIMITIVE_FIELD};
