//! Optimizer configuration.
//!
//! [`OptimizerFlags`] is the option set a translator hands to the middle-end
//! together with the graph. It can be built in code (presets plus `with_*`
//! setters) or parsed from a comma-separated `key=value` string, which is how
//! JIT hosts usually pass options through environment variables.

use std::{fmt, str::FromStr};

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{Error, Result};

/// Option keys accepted by [`OptimizerFlags::from_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OptionKey {
    /// [`OptimizerFlags::narrow_widths`]
    NarrowWidths,
    /// [`OptimizerFlags::delete_variables`]
    DeleteVariables,
    /// [`OptimizerFlags::preserve_critical_edges`]
    PreserveCriticalEdges,
    /// [`OptimizerFlags::peel_max_nodes`]
    PeelMaxNodes,
    /// [`OptimizerFlags::unroll_factor`]
    UnrollFactor,
    /// [`OptimizerFlags::unroll_max_nodes`]
    UnrollMaxNodes,
    /// [`OptimizerFlags::checked`]
    Checked,
    /// [`OptimizerFlags::max_dce_iterations`]
    MaxDceIterations,
}

/// Configuration of the optimization passes.
///
/// # Examples
///
/// ```rust
/// use midend::OptimizerFlags;
///
/// let flags: OptimizerFlags = "narrow_widths=false,unroll_factor=4".parse().unwrap();
/// assert!(!flags.narrow_widths);
/// assert_eq!(flags.unroll_factor, 4);
///
/// // Display produces a string that parses back to the same flags.
/// assert_eq!(flags.to_string().parse::<OptimizerFlags>().unwrap(), flags);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerFlags {
    /// Track used bit widths in dead code elimination and narrow conversions
    /// (default: true).
    pub narrow_widths: bool,

    /// Allow dead code elimination to delete stores to and declarations of
    /// plain variables. Only legal in the outermost, non-inlined scope
    /// (default: true).
    pub delete_variables: bool,

    /// Keep critical edges split when purging empty blocks (default: false).
    pub preserve_critical_edges: bool,

    /// Largest loop body, in nodes, that loop peeling duplicates (default: 8).
    pub peel_max_nodes: usize,

    /// Number of body copies produced by loop unrolling; 1 disables it
    /// (default: 1).
    pub unroll_factor: usize,

    /// Largest loop body, in nodes, that loop unrolling duplicates
    /// (default: 4).
    pub unroll_max_nodes: usize,

    /// Verify the graph before every pass and roll a pass back when it fails
    /// (default: on in debug builds).
    pub checked: bool,

    /// Upper bound on the cleanup rounds of dead code elimination
    /// (default: 16).
    pub max_dce_iterations: usize,
}

impl Default for OptimizerFlags {
    fn default() -> Self {
        Self {
            narrow_widths: true,
            delete_variables: true,
            preserve_critical_edges: false,
            peel_max_nodes: 8,
            unroll_factor: 1,
            unroll_max_nodes: 4,
            checked: cfg!(debug_assertions),
            max_dce_iterations: 16,
        }
    }
}

impl OptimizerFlags {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that only cleans up: no duplication, no width
    /// narrowing, no variable deletion.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            narrow_widths: false,
            delete_variables: false,
            peel_max_nodes: 0,
            unroll_factor: 1,
            unroll_max_nodes: 0,
            ..Self::default()
        }
    }

    /// Creates a configuration for aggressive duplication.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            peel_max_nodes: 32,
            unroll_factor: 4,
            unroll_max_nodes: 16,
            ..Self::default()
        }
    }

    /// Sets [`narrow_widths`](Self::narrow_widths).
    #[must_use]
    pub fn with_narrow_widths(mut self, enabled: bool) -> Self {
        self.narrow_widths = enabled;
        self
    }

    /// Sets [`delete_variables`](Self::delete_variables).
    #[must_use]
    pub fn with_delete_variables(mut self, enabled: bool) -> Self {
        self.delete_variables = enabled;
        self
    }

    /// Sets [`preserve_critical_edges`](Self::preserve_critical_edges).
    #[must_use]
    pub fn with_preserve_critical_edges(mut self, enabled: bool) -> Self {
        self.preserve_critical_edges = enabled;
        self
    }

    /// Sets [`peel_max_nodes`](Self::peel_max_nodes).
    #[must_use]
    pub fn with_peel_max_nodes(mut self, nodes: usize) -> Self {
        self.peel_max_nodes = nodes;
        self
    }

    /// Sets [`unroll_factor`](Self::unroll_factor) and
    /// [`unroll_max_nodes`](Self::unroll_max_nodes).
    #[must_use]
    pub fn with_unrolling(mut self, factor: usize, max_nodes: usize) -> Self {
        self.unroll_factor = factor;
        self.unroll_max_nodes = max_nodes;
        self
    }

    /// Sets [`checked`](Self::checked).
    #[must_use]
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Applies a single `key=value` option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for unknown keys and for values that
    /// do not parse as the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key: OptionKey = key
            .trim()
            .parse()
            .map_err(|_| Error::InvalidOption(format!("unknown option '{}'", key.trim())))?;
        let value = value.trim();
        match key {
            OptionKey::NarrowWidths => self.narrow_widths = parse_value(key, value)?,
            OptionKey::DeleteVariables => self.delete_variables = parse_value(key, value)?,
            OptionKey::PreserveCriticalEdges => {
                self.preserve_critical_edges = parse_value(key, value)?;
            }
            OptionKey::PeelMaxNodes => self.peel_max_nodes = parse_value(key, value)?,
            OptionKey::UnrollFactor => self.unroll_factor = parse_value(key, value)?,
            OptionKey::UnrollMaxNodes => self.unroll_max_nodes = parse_value(key, value)?,
            OptionKey::Checked => self.checked = parse_value(key, value)?,
            OptionKey::MaxDceIterations => self.max_dce_iterations = parse_value(key, value)?,
        }
        Ok(())
    }

    fn value_of(&self, key: OptionKey) -> String {
        match key {
            OptionKey::NarrowWidths => self.narrow_widths.to_string(),
            OptionKey::DeleteVariables => self.delete_variables.to_string(),
            OptionKey::PreserveCriticalEdges => self.preserve_critical_edges.to_string(),
            OptionKey::PeelMaxNodes => self.peel_max_nodes.to_string(),
            OptionKey::UnrollFactor => self.unroll_factor.to_string(),
            OptionKey::UnrollMaxNodes => self.unroll_max_nodes.to_string(),
            OptionKey::Checked => self.checked.to_string(),
            OptionKey::MaxDceIterations => self.max_dce_iterations.to_string(),
        }
    }
}

fn parse_value<T: FromStr>(key: OptionKey, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidOption(format!("{key}: cannot parse '{value}'")))
}

impl FromStr for OptimizerFlags {
    type Err = Error;

    /// Parses a comma-separated list of `key=value` pairs on top of the
    /// defaults. Empty entries are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let mut flags = Self::default();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| Error::InvalidOption(format!("expected key=value, got '{entry}'")))?;
            flags.set(key, value)?;
        }
        Ok(flags)
    }
}

impl fmt::Display for OptimizerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = OptionKey::iter()
            .map(|key| format!("{key}={}", self.value_of(key)))
            .collect();
        f.write_str(&parts.join(","))
    }
}
