// Error taxonomy and status codes.
//
// Errors are values: the parse entry points return them, and the error
// callback receives an `Issue` describing the same failure. The integer
// status codes exist for flat-result consumers (FFI shims, exit codes).

use std::io;

/// Status code for a successful parse.
pub const STATUS_OK: i32 = 0;

/// Parse failure. `code()` maps each variant to a stable integer status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Impossible parameter at an API boundary.
    #[error("invalid argument: {0}")]
    InvalidArguments(String),

    /// An allocation would exceed `max_memory_bytes`, or the allocator
    /// reported failure.
    #[error("memory limit exceeded")]
    OutOfMemory,

    /// Structural violation rejected in strict mode.
    #[error("parse error at row {row}: {message}")]
    Parse { message: &'static str, row: u64 },

    /// A field exceeded `max_field_size`.
    #[error("field of {size} bytes exceeds limit of {limit} bytes at row {row}")]
    FieldTooLarge { size: usize, limit: usize, row: u64 },

    /// The field bytes of a row exceeded `max_row_size`.
    #[error("row of {size} bytes exceeds limit of {limit} bytes at row {row}")]
    RowTooLarge { size: usize, limit: usize, row: u64 },

    /// Read failure in `parse_file` / `parse_stream`.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Stable integer status for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArguments(_) => -1,
            Error::OutOfMemory => -2,
            Error::Parse { .. } => -6,
            Error::FieldTooLarge { .. } => -7,
            Error::RowTooLarge { .. } => -8,
            Error::Io(_) => -9,
        }
    }

    /// Row the error was attached to, 0 when it has no row context.
    pub fn row_number(&self) -> u64 {
        match self {
            Error::Parse { row, .. }
            | Error::FieldTooLarge { row, .. }
            | Error::RowTooLarge { row, .. } => *row,
            _ => 0,
        }
    }
}

/// Payload handed to the error callback. Informational only: the callback
/// cannot request retry or skip.
#[derive(Debug, Clone)]
pub struct Issue {
    pub code: i32,
    pub message: String,
    pub row_number: u64,
}

impl Issue {
    pub(crate) fn from_error(err: &Error) -> Self {
        Issue {
            code: err.code(),
            message: err.to_string(),
            row_number: err.row_number(),
        }
    }
}
