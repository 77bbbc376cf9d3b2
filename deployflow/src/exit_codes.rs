//! Stable exit codes for the deployflow CLI.

use crate::error::DeployError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Unclassified failure (I/O, configuration, transport).
pub const INVALID: i32 = 1;
/// Target is not a directory, archive or git repository.
pub const UNSUPPORTED_TARGET: i32 = 2;
/// Clone or download failed.
pub const SOURCE_UNAVAILABLE: i32 = 3;
/// Repository path missing.
pub const NOT_FOUND: i32 = 4;
/// Oracle response broke the protocol.
pub const PROTOCOL_VIOLATION: i32 = 5;
/// User declined a confirmation.
pub const USER_ABORTED: i32 = 6;
/// Oracle halted with an error.
pub const ORACLE_HALTED: i32 = 7;
/// Workspace or destination directory conflict.
pub const WORKSPACE_CONFLICT: i32 = 8;
/// Configured turn ceiling reached.
pub const TURN_LIMIT: i32 = 9;

/// Map a classified error to its exit code.
pub fn for_error(err: Option<&DeployError>) -> i32 {
    match err {
        Some(DeployError::UnsupportedTarget(_)) => UNSUPPORTED_TARGET,
        Some(DeployError::SourceUnavailable(_)) => SOURCE_UNAVAILABLE,
        Some(DeployError::NotFound(_)) => NOT_FOUND,
        Some(DeployError::OracleProtocolViolation(_)) => PROTOCOL_VIOLATION,
        Some(DeployError::UserAborted(_)) => USER_ABORTED,
        Some(DeployError::OracleHalted(_)) => ORACLE_HALTED,
        Some(DeployError::WorkspaceConflict(_)) => WORKSPACE_CONFLICT,
        Some(DeployError::TurnLimitExceeded { .. }) => TURN_LIMIT,
        None => INVALID,
    }
}
