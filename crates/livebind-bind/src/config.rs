//! Binding settings.
//!
//! [`BindConfig`] holds what can be written in a TOML file. [`BindOptions`]
//! wraps it together with runtime-only choices: the serializer, the
//! operations, a custom reset closure and an explicit initial-state key.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use livebind_types::Value;

use crate::error::BindResult;
use crate::ops::{DefaultOperations, Operations};
use crate::serialize::{RecordSerializer, Serializer};

/// What a stopped binding leaves in its target, as named in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    /// Leave the last value in place.
    #[default]
    Keep,
    /// Write the empty value of the target's shape.
    Clear,
}

/// Serializable binding settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Collection bindings stage items and publish the whole list once the
    /// initial load completes.
    pub wait: bool,
    /// Reset applied when the binding is stopped without an explicit policy.
    pub reset: ResetMode,
    /// Unsubscribe after the first value resolves. Always on during a
    /// server render.
    pub once: bool,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            wait: true,
            reset: ResetMode::Keep,
            once: false,
        }
    }
}

impl BindConfig {
    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> BindResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

type ResetFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// What a stopped binding writes into its target.
#[derive(Clone, Default)]
pub enum ResetPolicy {
    /// Leave the target untouched.
    Keep,
    /// Write `Null` for objects and `[]` for lists.
    #[default]
    Clear,
    /// Write the value returned by the function.
    With(ResetFn),
}

impl ResetPolicy {
    /// Write the value returned by `f`.
    pub fn with(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::With(Arc::new(f))
    }

    /// The value to write, or `None` to keep the current one.
    pub fn value(&self, empty: impl FnOnce() -> Value) -> Option<Value> {
        match self {
            Self::Keep => None,
            Self::Clear => Some(empty()),
            Self::With(f) => Some(f()),
        }
    }
}

impl From<ResetMode> for ResetPolicy {
    fn from(mode: ResetMode) -> Self {
        match mode {
            ResetMode::Keep => Self::Keep,
            ResetMode::Clear => Self::Clear,
        }
    }
}

impl fmt::Debug for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => f.write_str("Keep"),
            Self::Clear => f.write_str("Clear"),
            Self::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

/// Everything a bind call needs besides the source and target.
#[derive(Clone)]
pub struct BindOptions {
    config: BindConfig,
    reset: Option<ResetPolicy>,
    serializer: Arc<dyn Serializer>,
    ops: Arc<dyn Operations>,
    ssr_key: Option<String>,
}

impl BindOptions {
    /// Options with the default [`BindConfig`].
    pub fn new() -> Self {
        Self::from_config(BindConfig::default())
    }

    /// Options carrying `config`, with the record serializer and default operations.
    pub fn from_config(config: BindConfig) -> Self {
        Self {
            config,
            reset: None,
            serializer: Arc::new(RecordSerializer),
            ops: Arc::new(DefaultOperations),
            ssr_key: None,
        }
    }

    /// Stage list items until the initial load completes.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.config.wait = wait;
        self
    }

    /// Unsubscribe once the first value resolves.
    pub fn with_once(mut self, once: bool) -> Self {
        self.config.once = once;
        self
    }

    /// Reset applied on stop, overriding the configured [`ResetMode`].
    pub fn with_reset(mut self, policy: ResetPolicy) -> Self {
        self.reset = Some(policy);
        self
    }

    /// Replace the snapshot serializer.
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Replace the operations used to write the target.
    pub fn with_operations(mut self, ops: impl Operations + 'static) -> Self {
        self.ops = Arc::new(ops);
        self
    }

    /// Key under which the initial value is stored, instead of the source path.
    pub fn with_ssr_key(mut self, key: impl Into<String>) -> Self {
        self.ssr_key = Some(key.into());
        self
    }

    /// The serializable part of the options.
    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Mutable access for settings forced by the binder.
    pub(crate) fn config_mut(&mut self) -> &mut BindConfig {
        &mut self.config
    }

    /// The reset applied by a plain `stop()`.
    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset
            .clone()
            .unwrap_or_else(|| self.config.reset.into())
    }

    /// The snapshot serializer.
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// The operations used to write the target.
    pub fn ops(&self) -> &Arc<dyn Operations> {
        &self.ops
    }

    /// The explicit initial-state key, if any.
    pub fn ssr_key(&self) -> Option<&str> {
        self.ssr_key.as_deref()
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BindConfig> for BindOptions {
    fn from(config: BindConfig) -> Self {
        Self::from_config(config)
    }
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("config", &self.config)
            .field("reset", &self.reset)
            .field("ssr_key", &self.ssr_key)
            .finish_non_exhaustive()
    }
}
