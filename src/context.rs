//! Explicit context passed by reference to every subsystem at construction,
//! replacing module-level logger/config singletons (spec §9, "Global state").

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;

/// Abstraction over wall-clock time so tests can use a fixed or stepped clock
/// instead of `SystemTime::now()`.
pub trait Clock: Send + Sync {
    /// Current time as whole seconds since the Unix epoch.
    fn now_unix_secs(&self) -> u64;
}

/// Real system clock, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock that always returns a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_unix_secs(&self) -> u64 {
        self.0
    }
}

/// Shared context handed to library, playlist, and playback constructors.
#[derive(Clone)]
pub struct Context {
    /// Mutable in-memory configuration, shared across subsystems.
    pub config: Arc<Mutex<Config>>,
    /// Time source used for timestamps in persisted records.
    pub clock: Arc<dyn Clock>,
}

impl Context {
    /// Builds a production context from a loaded configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Builds a context for tests with a fixed clock and default config.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            config: Arc::new(Mutex::new(Config::default())),
            clock: Arc::new(FixedClock(1_700_000_000)),
        }
    }

    /// Returns a clone of the current configuration snapshot.
    pub fn config_snapshot(&self) -> Config {
        self.config.lock().expect("config lock poisoned").clone()
    }
}
