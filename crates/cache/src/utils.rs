//! Helper macros shared by the codec and buffer modules.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// This is the non-panicking sibling of `assert!`, used for validating
/// untrusted input such as counts read off the wire.
///
/// # Example
///
/// ```ignore
/// ensure!(count <= remaining, FormatError::corrupted("header count exceeds input"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
