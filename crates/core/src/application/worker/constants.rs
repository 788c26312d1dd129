// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default number of worker tasks
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;

/// Default retention of terminal results (24 hours)
pub const DEFAULT_RESULT_EXPIRES: Duration = Duration::from_secs(24 * 3600);

/// How often running daemons look for orphaned reservations (1 minute)
pub const RECOVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How often the retention sweep runs (1 hour)
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
