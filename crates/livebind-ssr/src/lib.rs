//! Initial-state capture and replay for livebind.
//!
//! During a server render, each binding's first resolved value is recorded
//! in an [`SsrState`] owned by the host app. The state is serialized into the
//! rendered output, and on the client it is seeded back into the registry
//! before any binding runs. A binding then reads its initial value from the
//! store instead of waiting for the network.
//!
//! # Architecture
//!
//! - [`InitialStateRegistry`] maps an [`AppId`] to its state. It is explicit:
//!   state is created with `init` or `seed` and dropped with `teardown`.
//!   [`InitialStateRegistry::global`] is the process-wide instance.
//! - [`InitialState`] is a cheap handle to one app's state, providing the
//!   `get` / `defer` contract used by bindings.
//! - [`PendingPromises`] tracks the fetches a server render must wait for.
//!
//! [`AppId`]: livebind_types::AppId

pub mod error;
pub mod pending;
pub mod registry;
pub mod state;

pub use error::{SsrError, SsrResult};
pub use pending::{PendingGuard, PendingPromises};
pub use registry::{InitialState, InitialStateRegistry};
pub use state::SsrState;
