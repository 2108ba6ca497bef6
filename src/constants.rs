/// Number of most recent log entries embedded in job listings
pub const RECENT_LOG_LIMIT: usize = 10;

/// Maximum number of exclusion patterns per settings profile
pub const MAX_EXCLUDED_PATTERNS: usize = 64;

/// Maximum length of a single exclusion pattern
pub const MAX_PATTERN_LENGTH: usize = 256;

/// Maximum length of a backup name
pub const MAX_NAME_LENGTH: usize = 128;

/// Upper bound on maxConcurrent
/// A profile asking for more parallelism than this is almost certainly a
/// client bug rather than a real capacity request
pub const MAX_CONCURRENT_CAP: u32 = 64;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a delete request without an id
pub const ERR_MISSING_ID: &str = "Missing required id parameter";

/// Error message for invalid compression level
pub const ERR_INVALID_COMPRESSION: &str = "Compression must be one of LOW, MEDIUM, HIGH";

/// Error message for invalid backup type
pub const ERR_INVALID_BACKUP_TYPE: &str = "Backup type must be one of FULL, INCREMENTAL";

/// Error message for invalid schedule frequency
pub const ERR_INVALID_FREQUENCY: &str = "Frequency must be one of DAILY, WEEKLY, MONTHLY";

/// Error message for invalid time of day
pub const ERR_INVALID_TIME_OF_DAY: &str = "timeOfDay must be in 24-hour HH:mm format";
