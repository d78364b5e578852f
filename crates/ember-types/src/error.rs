//! Unified error interface for ember.
//!
//! Every ember error type implements [`ErrorCode`] so callers can branch on a
//! stable code instead of matching message text.
//!
//! # Example
//!
//! ```
//! use ember_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum PoolError {
//!     Exhausted,
//!     BadTag,
//! }
//!
//! impl ErrorCode for PoolError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Exhausted => "POOL_EXHAUSTED",
//!             Self::BadTag => "POOL_BAD_TAG",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Exhausted)
//!     }
//! }
//!
//! let err = PoolError::Exhausted;
//! assert_eq!(err.code(), "POOL_EXHAUSTED");
//! assert!(err.is_recoverable());
//! ```

/// Unified error code interface for ember errors.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**, e.g. `"SCOPE_QUEUE_FULL"`
/// - **Prefixed** with the owning layer (`"SCOPE_"`, `"CONFIG_"`)
/// - **Stable**: a code is part of the API once published
///
/// # Recoverability
///
/// An error is recoverable when the same request may succeed later without
/// changing code: a full queue drains, an exhausted pool frees slots, a
/// stopping scope becomes idle again. Deadlock rejections and misuse are not
/// recoverable; retrying them reproduces the same condition.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows ember conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use ember_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// enum MyError { Timeout }
///
/// impl ErrorCode for MyError {
///     fn code(&self) -> &'static str { "MY_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&MyError::Timeout, "MY_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every variant of an error enum at once.
///
/// # Panics
///
/// Panics on the first code that fails [`assert_error_code`].
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
