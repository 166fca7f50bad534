//! Command size estimation and the host-derived size budget
//!
//! The kernel copies argument strings and the environment into the new
//! process image, and the total must stay under `ARG_MAX`. Every variable
//! also costs a pointer slot, and a fixed margin absorbs whatever the
//! estimate misses.

use crate::template::Template;
use crate::types::SymbolTable;

/// Largest command size ever planned for, in bytes
///
/// Also the Linux limit for one argument string, which is what a shell
/// command becomes.
pub const DEFAULT_ARG_MAX: usize = 131_072;

/// Bytes held back from the budget for per-argument overhead
pub const DEFAULT_SAFETY_MARGIN: usize = 2048;

/// Bytes charged per environment variable for its pointer slot
pub const ENV_POINTER_SIZE: usize = 4;

/// Size of the command `template` evaluates to under `symbols`
///
/// Exec arguments are counted joined by single spaces, shell commands as
/// written. The chunker decides fit with this same function.
pub fn estimated_size(template: &Template, symbols: &SymbolTable) -> usize {
    template.render(symbols, false).rendered_len()
}

/// Maximum command size computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBudget {
    /// Host argument limit
    pub arg_max: usize,
    /// Bytes held back
    pub safety_margin: usize,
}

impl Default for CommandBudget {
    fn default() -> Self {
        Self::new(DEFAULT_ARG_MAX)
    }
}

impl CommandBudget {
    pub fn new(arg_max: usize) -> Self {
        Self {
            arg_max,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    /// Budget based on this host's `ARG_MAX`
    pub fn host() -> Self {
        Self::new(host_arg_max())
    }

    pub fn with_safety_margin(mut self, margin: usize) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Serialized size of an environment: `key value` per variable
    pub fn environment_size<I, K, V>(env: I) -> (usize, usize)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<std::ffi::OsStr>,
        V: AsRef<std::ffi::OsStr>,
    {
        env.into_iter().fold((0, 0), |(bytes, count), (k, v)| {
            let pair = k.as_ref().len() + 1 + v.as_ref().len();
            (bytes + pair, count + 1)
        })
    }

    /// Bytes available to a command started with environment `env`
    pub fn max_size<I, K, V>(&self, env: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<std::ffi::OsStr>,
        V: AsRef<std::ffi::OsStr>,
    {
        let (env_bytes, env_count) = Self::environment_size(env);
        self.arg_max
            .saturating_sub(env_bytes)
            .saturating_sub(env_count * ENV_POINTER_SIZE)
            .saturating_sub(self.safety_margin)
    }

    /// Bytes available to a command inheriting this process's environment
    pub fn for_current_process(&self) -> usize {
        self.max_size(std::env::vars_os())
    }
}

/// `sysconf(_SC_ARG_MAX)`, capped at [`DEFAULT_ARG_MAX`]
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn host_arg_max() -> usize {
    // SAFETY: sysconf only reads a system limit
    let value = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    if value > 0 {
        usize::try_from(value)
            .unwrap_or(DEFAULT_ARG_MAX)
            .min(DEFAULT_ARG_MAX)
    } else {
        log::debug!("sysconf(_SC_ARG_MAX) unavailable, using {}", DEFAULT_ARG_MAX);
        DEFAULT_ARG_MAX
    }
}

#[cfg(not(unix))]
pub fn host_arg_max() -> usize {
    DEFAULT_ARG_MAX
}
