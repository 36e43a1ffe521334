//! Engine configuration
//!
//! The engine has exactly two knobs:
//!
//! - **verbose diagnostics**: misuse of the dynamic API (a kind-specific
//!   accessor on the wrong kind, setting a read-only handle, ...) normally
//!   returns `None`/`false` and logs a warning. With verbose diagnostics on,
//!   the same misuse panics with the message instead.
//! - **gc threshold**: allocated bytes after which [`crate::gc::Heap::should_collect`]
//!   starts reporting true.
//!
//! The process-wide setting is installed once; a thread-scoped override of
//! the verbose flag exists so tests can exercise both modes side by side.

use once_cell::sync::OnceCell;
use std::cell::Cell;
use std::fmt;

/// Environment variable enabling verbose diagnostics
pub const VERBOSE_ENV: &str = "REFRACT_VERBOSE";

/// Environment variable overriding the collector threshold, in bytes
pub const GC_THRESHOLD_ENV: &str = "REFRACT_GC_THRESHOLD";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Panic on API misuse instead of returning an empty result
    pub verbose_diagnostics: bool,

    /// Allocated bytes before a collection is suggested
    pub gc_threshold_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose_diagnostics: false,
            gc_threshold_bytes: 1024 * 1024, // 1 MB
        }
    }
}

impl Config {
    /// Build a configuration from `REFRACT_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(v) = std::env::var(VERBOSE_ENV) {
            config.verbose_diagnostics = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Ok(v) = std::env::var(GC_THRESHOLD_ENV) {
            if let Ok(bytes) = v.trim().parse::<usize>() {
                config.gc_threshold_bytes = bytes;
            }
        }
        config
    }

    /// Enable or disable verbose diagnostics
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose_diagnostics = verbose;
        self
    }
}

static CONFIG: OnceCell<Config> = OnceCell::new();

thread_local! {
    static VERBOSE_OVERRIDE: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Install the process-wide configuration
///
/// Returns `false` if a configuration was already installed (or already
/// read, which installs the environment-derived default).
pub fn install(config: Config) -> bool {
    CONFIG.set(config).is_ok()
}

/// The process-wide configuration
pub fn current() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Whether misuse should panic on the calling thread
pub fn is_verbose() -> bool {
    VERBOSE_OVERRIDE
        .with(|o| o.get())
        .unwrap_or_else(|| current().verbose_diagnostics)
}

/// Run `f` with verbose diagnostics forced on or off for this thread
pub fn with_verbose<R>(verbose: bool, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<bool>);
    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0;
            VERBOSE_OVERRIDE.with(|o| o.set(prev));
        }
    }

    let _restore = Restore(VERBOSE_OVERRIDE.with(|o| o.replace(Some(verbose))));
    f()
}

/// Report misuse of the dynamic API
///
/// Panics in verbose mode, otherwise logs and lets the caller return its
/// empty result.
pub(crate) fn misuse(op: &str, detail: impl fmt::Display) {
    if is_verbose() {
        panic!("refract: {}: {}", op, detail);
    }
    tracing::warn!(op, %detail, "ignored misuse of dynamic value");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.verbose_diagnostics);
        assert_eq!(config.gc_threshold_bytes, 1024 * 1024);
        assert!(config.with_verbose(true).verbose_diagnostics);
    }

    #[test]
    fn test_verbose_override_is_scoped() {
        let before = is_verbose();
        with_verbose(true, || {
            assert!(is_verbose());
            with_verbose(false, || assert!(!is_verbose()));
            assert!(is_verbose());
        });
        assert_eq!(is_verbose(), before);
    }

    #[test]
    #[should_panic(expected = "refract: set")]
    fn test_misuse_panics_when_verbose() {
        with_verbose(true, || misuse("set", "value is not addressable"));
    }

    #[test]
    fn test_misuse_is_quiet_by_default() {
        with_verbose(false, || misuse("set", "value is not addressable"));
    }
}
