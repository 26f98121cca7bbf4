//! Helper macros used across the crate.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// The `Result` counterpart of `assert!`, used for protocol validation:
///
/// ```ignore
/// ensure!(declared <= limit, QuasiHttpError::chunk_size_exceeded(declared, limit));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
