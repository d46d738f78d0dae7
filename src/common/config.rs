/// Length of the data file header: a little-endian u32 page size.
pub const HEADER_LEN: u64 = 4;

/// Page size must be a positive multiple of this many bytes.
pub const PAGE_SIZE_UNIT: usize = 1024;

/// Default page size passed to `init` when none is given (64 KiB).
pub const DEFAULT_PAGE_SIZE_KB: usize = 64;

/// Maximum number of I/O tasks in flight at once.
pub const IO_QUEUE_DEPTH: usize = 16;

/// Minimum buffer pool capacity (history tier needs at least one slot).
pub const MIN_POOL_SIZE: usize = 4;

/// Data file name inside the database directory.
pub const DATA_FILE: &str = "pico.db";

/// Lock file name, reserved for cross-process advisory locking.
pub const LOCK_FILE: &str = "picodb.lock";

/// Binary log file name, reserved for write-ahead logging.
pub const BINLOG_FILE: &str = "picodb.binlog";

/// Directory name under the per-user application data directory.
pub const APP_DIR_NAME: &str = "picodb";
