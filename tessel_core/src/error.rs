//! Error types and result definitions for Tessel.
//!
//! Every error is a contract violation detected at the call site. Nothing in
//! the storage engine performs I/O, so there are no transient failures and no
//! operation is ever retried on the caller's behalf.

use thiserror::Error;

/// The unified result type used throughout Tessel.
pub type TesselResult<T> = Result<T, TesselError>;

/// Errors raised by container operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TesselError {
    /// In-place mutation of a committed (frozen) instance.
    #[error("ImmutabilityViolation: cannot modify committed {kind}")]
    Immutable {
        /// The container type that rejected the write.
        kind: &'static str,
    },

    /// Positional index outside the valid range.
    #[error("BoundsViolation: index {index} out of range for length {len}")]
    OutOfBounds {
        /// The offending index.
        index: usize,
        /// Length of the container at the time of the call.
        len: usize,
    },

    /// A required argument violated the operation's contract.
    #[error("InvalidArgument: {message}")]
    InvalidArgument {
        /// Error description.
        message: String,
    },
}

impl TesselError {
    /// Create an immutability error for the given container kind.
    #[must_use]
    pub fn immutable(kind: &'static str) -> Self {
        Self::Immutable { kind }
    }

    /// Create a bounds error.
    #[must_use]
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::OutOfBounds { index, len }
    }

    /// Create an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get the taxonomy name of this error.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Immutable { .. } => "ImmutabilityViolation",
            Self::OutOfBounds { .. } => "BoundsViolation",
            Self::InvalidArgument { .. } => "InvalidArgument",
        }
    }
}

/// Check `index < len` for element access.
#[inline]
pub fn check_index(index: usize, len: usize) -> TesselResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(TesselError::out_of_bounds(index, len))
    }
}

/// Check `index <= len` for insertion.
#[inline]
pub fn check_insert_index(index: usize, len: usize) -> TesselResult<()> {
    if index <= len {
        Ok(())
    } else {
        Err(TesselError::out_of_bounds(index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_error() {
        let err = TesselError::immutable("Object");

        assert_eq!(err.category(), "ImmutabilityViolation");
        assert_eq!(
            err.to_string(),
            "ImmutabilityViolation: cannot modify committed Object"
        );
    }

    #[test]
    fn test_out_of_bounds_error() {
        let err = TesselError::out_of_bounds(5, 3);

        match &err {
            TesselError::OutOfBounds { index, len } => {
                assert_eq!(*index, 5);
                assert_eq!(*len, 3);
            }
            _ => panic!("Expected OutOfBounds"),
        }
        assert_eq!(err.category(), "BoundsViolation");
        assert_eq!(
            err.to_string(),
            "BoundsViolation: index 5 out of range for length 3"
        );
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = TesselError::invalid_argument("duplicate name 'a'");

        assert_eq!(err.category(), "InvalidArgument");
        assert!(err.to_string().contains("duplicate name"));
    }

    #[test]
    fn test_check_index() {
        assert!(check_index(0, 1).is_ok());
        assert_eq!(check_index(1, 1), Err(TesselError::out_of_bounds(1, 1)));
        assert!(check_index(0, 0).is_err());
    }

    #[test]
    fn test_check_insert_index() {
        assert!(check_insert_index(0, 0).is_ok());
        assert!(check_insert_index(3, 3).is_ok());
        assert!(check_insert_index(4, 3).is_err());
    }

    #[test]
    fn test_error_is_clone() {
        let original = TesselError::invalid_argument("x");
        assert_eq!(original.clone(), original);
    }
}
