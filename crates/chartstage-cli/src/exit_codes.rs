//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - the command completed, or the poll is in progress or succeeded
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure, or the poll reported FAILED
pub const ERROR: i32 = 1;

/// Validation error - malformed request, identifier or assignment
pub const VALIDATION_ERROR: i32 = 2;

/// Fetch error - a download or object storage call failed
pub const FETCH_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
