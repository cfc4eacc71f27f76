//! Runtime configuration: compile-time defaults with `RT_*` environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use fiberio_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .max_tasks(4096)
//!     .op_timeout_ms(5_000);
//! ```

use fiberio_core::env::env_get;

/// Map the documented `RT_BACKEND` vocabulary (`auto`/`busy`/`poll`/`uring`)
/// onto the internal canonical names `select()` in `fiberio-backends`
/// actually matches on (`""`/`busy`/`readiness`/`uring`). `auto` is the
/// same platform-driven default as leaving the variable unset; `poll`
/// names the readiness-based reactor the way `epoll`/`kqueue` users would
/// expect, without committing the public vocabulary to either syscall.
fn normalize_backend(name: &str) -> String {
    match name {
        "auto" => String::new(),
        "poll" => "readiness".to_string(),
        other => other.to_string(),
    }
}

mod defaults {
    pub const MAX_TASKS: usize = 65536;
    pub const AIO_JOBS_MAX: usize = 1024;
    pub const AIO_REAP_MAX: usize = 256;
    pub const OP_TIMEOUT_MS: u64 = 30_000;
    pub const STACK_SIZE: usize = 16 * 1024;
    pub const NUM_WORKERS: usize = 1;
}

/// Runtime configuration with a builder interface.
///
/// Use [`RuntimeConfig::from_env`] to start with compile-time defaults and
/// apply any `RT_*` overrides, or [`RuntimeConfig::new`] for hermetic
/// defaults (tests should prefer `new` to avoid depending on the process
/// environment).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of runtime instances to run, each on its own OS thread, in
    /// `auto` threading mode. Ignored in `single` mode.
    pub num_workers: usize,
    /// Maximum number of concurrently live task slots.
    pub max_tasks: usize,
    /// Maximum number of in-flight AIO jobs a backend will accept at once.
    pub aio_jobs_max: usize,
    /// Maximum completions drained per backend `reap` call.
    pub aio_reap_max: usize,
    /// Per-operation timeout, honored only by the busy-loop backend.
    pub op_timeout_ms: u64,
    /// Default per-frame stack size in bytes.
    pub stack_size: usize,
    /// Backend selection override, already normalized to the canonical
    /// names `fiberio-backends::select` matches on: `busy`, `readiness`,
    /// `uring`, or empty for platform-driven auto-selection. Set via
    /// [`RuntimeConfig::backend`] or `RT_BACKEND`, both of which also
    /// accept the public aliases `auto` (-> empty) and `poll` (->
    /// `readiness`).
    pub backend: String,
    /// Enable verbose scheduler/backend logging via `rtlog`.
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Build from compile-time defaults with environment overrides.
    ///
    /// Recognized variables (all optional):
    /// - `RT_NUM_WORKERS`
    /// - `RT_MAX_TASKS`
    /// - `RT_AIO_JOBS_MAX`
    /// - `RT_AIO_REAP_MAX`
    /// - `RT_OP_TIMEOUT_MS`
    /// - `RT_STACK_SIZE`
    /// - `RT_BACKEND` — `auto` | `busy` | `poll` | `uring` (`poll` aliases
    ///   `readiness`; `auto` aliases the empty, platform-driven default)
    /// - `RT_DEBUG` — `0`/`1`
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("RT_NUM_WORKERS", defaults::NUM_WORKERS),
            max_tasks: env_get("RT_MAX_TASKS", defaults::MAX_TASKS),
            aio_jobs_max: env_get("RT_AIO_JOBS_MAX", defaults::AIO_JOBS_MAX),
            aio_reap_max: env_get("RT_AIO_REAP_MAX", defaults::AIO_REAP_MAX),
            op_timeout_ms: env_get("RT_OP_TIMEOUT_MS", defaults::OP_TIMEOUT_MS),
            stack_size: env_get("RT_STACK_SIZE", defaults::STACK_SIZE),
            backend: normalize_backend(&std::env::var("RT_BACKEND").unwrap_or_default()),
            debug: env_get("RT_DEBUG", 0usize) != 0,
        }
    }

    /// Build from compile-time defaults, ignoring the environment.
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            max_tasks: defaults::MAX_TASKS,
            aio_jobs_max: defaults::AIO_JOBS_MAX,
            aio_reap_max: defaults::AIO_REAP_MAX,
            op_timeout_ms: defaults::OP_TIMEOUT_MS,
            stack_size: defaults::STACK_SIZE,
            backend: String::new(),
            debug: false,
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn max_tasks(mut self, n: usize) -> Self {
        self.max_tasks = n;
        self
    }

    pub fn aio_jobs_max(mut self, n: usize) -> Self {
        self.aio_jobs_max = n;
        self
    }

    pub fn aio_reap_max(mut self, n: usize) -> Self {
        self.aio_reap_max = n;
        self
    }

    pub fn op_timeout_ms(mut self, ms: u64) -> Self {
        self.op_timeout_ms = ms;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = normalize_backend(&name.into());
        self
    }

    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// Validate the configuration, rejecting values that would make the
    /// scheduler or a backend misbehave rather than merely run slowly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::InvalidValue("max_tasks must be > 0"));
        }
        if self.aio_jobs_max == 0 || self.aio_jobs_max & (self.aio_jobs_max - 1) != 0 {
            return Err(ConfigError::InvalidValue("aio_jobs_max must be a power of two"));
        }
        if self.aio_reap_max == 0 {
            return Err(ConfigError::InvalidValue("aio_reap_max must be > 0"));
        }
        if self.stack_size < 4096 {
            return Err(ConfigError::InvalidValue("stack_size must be >= 4096 bytes"));
        }
        match self.backend.as_str() {
            "" | "busy" | "readiness" | "uring" => {}
            _ => return Err(ConfigError::InvalidValue("backend must be busy, readiness, uring, or empty")),
        }
        Ok(())
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, Copy)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid runtime config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RuntimeConfig::new().validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let cfg = RuntimeConfig::new().num_workers(4).stack_size(64 * 1024);
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.stack_size, 64 * 1024);
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(RuntimeConfig::new().num_workers(0).validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_jobs_max() {
        assert!(RuntimeConfig::new().aio_jobs_max(100).validate().is_err());
        assert!(RuntimeConfig::new().aio_jobs_max(128).validate().is_ok());
    }

    #[test]
    fn rejects_undersized_stack() {
        assert!(RuntimeConfig::new().stack_size(100).validate().is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(RuntimeConfig::new().backend("nonsense").validate().is_err());
        assert!(RuntimeConfig::new().backend("uring").validate().is_ok());
    }

    #[test]
    fn accepts_documented_backend_aliases() {
        let auto = RuntimeConfig::new().backend("auto");
        assert_eq!(auto.backend, "");
        assert!(auto.validate().is_ok());

        let poll = RuntimeConfig::new().backend("poll");
        assert_eq!(poll.backend, "readiness");
        assert!(poll.validate().is_ok());
    }
}
