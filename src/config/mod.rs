use chrono::Duration;
use std::env;
use std::time::Duration as StdDuration;

/// Queue capacity and token lifetime. Passed into `QueueManager` at
/// construction; never read from hidden process-wide constants.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of tokens admitted (ONGOING) at the same time.
    pub max_concurrent: usize,
    /// How long a promoted token stays admitted before it expires.
    pub token_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            token_ttl: Duration::minutes(5),
        }
    }
}

/// Seat-hold lifetime for `SeatReservationCoordinator`.
#[derive(Debug, Clone)]
pub struct HoldConfig {
    pub hold_ttl: Duration,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(5),
        }
    }
}

/// Bounded wait for per-key exclusive locks. Exceeding it fails the
/// operation with a transient error instead of deadlocking.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub wait_timeout: StdDuration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout: StdDuration::from_secs(3),
        }
    }
}

/// Cadence of the background sweeps.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: StdDuration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub queue: QueueConfig,
    pub hold: HoldConfig,
    pub lock: LockConfig,
    pub sweep: SweepConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            queue: QueueConfig {
                max_concurrent: env_usize("QUEUE_MAX_CONCURRENT", 50),
                token_ttl: Duration::seconds(env_i64("QUEUE_TOKEN_TTL_SECS", 300)),
            },
            hold: HoldConfig {
                hold_ttl: Duration::seconds(env_i64("SEAT_HOLD_TTL_SECS", 300)),
            },
            lock: LockConfig {
                wait_timeout: StdDuration::from_millis(env_u64("LOCK_WAIT_TIMEOUT_MS", 3000)),
            },
            sweep: SweepConfig {
                interval: StdDuration::from_millis(env_u64("SWEEP_INTERVAL_MS", 10_000)),
            },
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
