use mongodb::error::{Error, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// True when a write was rejected by a unique index.
pub fn is_duplicate_key(err: &Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY_CODE
    )
}

