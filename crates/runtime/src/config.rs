//! Runtime configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `UAL_STACK_SIZE` | `131072` | Coroutine stack size in bytes |
//! | `UAL_POOL_CAPACITY` | `10000` | Coroutine pool capacity |
//! | `UAL_WORKERS` | May's default | Scheduler worker threads |
//! | `UAL_LOG` | `warn` | tracing filter directives |
//!
//! Coroutine settings are process-wide in May, so they are applied once, by
//! the first Scheduler created. Later configs only affect logging.

use std::sync::Once;

static MAY_CONFIGURED: Once = Once::new();

/// Default coroutine stack size: 128KB (0x20000 bytes)
pub const DEFAULT_STACK_SIZE: usize = 0x20000;

/// Default coroutine pool capacity.
/// May reuses completed coroutine stacks from this pool; its own default of
/// 1000 is small for launch-heavy programs.
pub const DEFAULT_POOL_CAPACITY: usize = 10000;

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub stack_size: usize,
    pub pool_capacity: usize,
    /// None keeps May's default (one worker per core)
    pub workers: Option<usize>,
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            workers: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let stack_size = parse_stack_size(std::env::var("UAL_STACK_SIZE").ok());

        let pool_capacity =
            parse_positive("UAL_POOL_CAPACITY", std::env::var("UAL_POOL_CAPACITY").ok())
                .unwrap_or(DEFAULT_POOL_CAPACITY);

        let workers = parse_positive("UAL_WORKERS", std::env::var("UAL_WORKERS").ok());

        let log_filter = std::env::var("UAL_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            stack_size,
            pool_capacity,
            workers,
            log_filter,
        }
    }

    /// Push coroutine settings into May. Only the first call in a process
    /// has any effect; returns whether this call applied them.
    pub fn apply(&self) -> bool {
        let mut applied = false;
        MAY_CONFIGURED.call_once(|| {
            let cfg = may::config();
            cfg.set_stack_size(self.stack_size)
                .set_pool_capacity(self.pool_capacity);
            if let Some(workers) = self.workers {
                cfg.set_workers(workers);
            }
            tracing::debug!(
                stack_size = self.stack_size,
                pool_capacity = self.pool_capacity,
                workers = ?self.workers,
                "coroutine runtime configured"
            );
            applied = true;
        });
        applied
    }
}

/// Parse stack size from an optional string value.
/// Returns the parsed size, or DEFAULT_STACK_SIZE if the value is missing, zero, or invalid.
fn parse_stack_size(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => {
                tracing::warn!(
                    "UAL_STACK_SIZE=0 is invalid, using default {}",
                    DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
            Ok(size) => size,
            Err(_) => {
                tracing::warn!(
                    "UAL_STACK_SIZE='{}' is not a valid number, using default {}",
                    val,
                    DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
        },
        None => DEFAULT_STACK_SIZE,
    }
}

/// A positive count, or None when unset; invalid values are warned and ignored
fn parse_positive(name: &str, env_value: Option<String>) -> Option<usize> {
    let val = env_value?;
    match val.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!("{}='{}' is not a positive number, ignoring", name, val);
            None
        }
    }
}
