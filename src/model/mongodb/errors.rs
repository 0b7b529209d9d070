//! The mongodb crate doesn't provide error code constants; this fills in the
//! ones we care about.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given result failed on a unique index.
///
/// Inserts report this as a write error, whereas `findAndModify` (and hence
/// upserts through `find_one_and_update`) report it as a command error.
pub fn is_duplicate_key_error<T>(result: Result<T, &DbError>) -> bool {
    match result {
        Ok(_) => false,
        Err(err) => match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
            ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
            _ => false,
        },
    }
}
