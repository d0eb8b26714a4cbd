//! Error handler for the user directory.

use std::fmt;

use crate::table::TableError;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Enum representing directory errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl DirectoryError {
    /// Stable code describing the failure.
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::InvalidArgument { .. } => "InvalidArgument",
            DirectoryError::Table(err) => err.code(),
            DirectoryError::Crypto(_) => "CryptoError",
        }
    }

    pub(crate) fn invalid_argument(
        name: &'static str,
        reason: &'static str,
    ) -> Self {
        DirectoryError::InvalidArgument { name, reason }
    }
}

/// Failure detail of an [`IdentityResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    pub code: String,
    pub description: String,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

impl From<&DirectoryError> for IdentityError {
    fn from(err: &DirectoryError) -> Self {
        Self {
            code: err.code().to_owned(),
            description: err.to_string(),
        }
    }
}

/// Outcome of a mutating identity operation.
///
/// Storage failures are reported here instead of being returned as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "identity operations may fail and failures must be handled"]
pub enum IdentityResult {
    Success,
    Failed(Vec<IdentityError>),
}

impl IdentityResult {
    pub fn succeeded(&self) -> bool {
        matches!(self, IdentityResult::Success)
    }

    pub fn errors(&self) -> &[IdentityError] {
        match self {
            IdentityResult::Success => &[],
            IdentityResult::Failed(errors) => errors,
        }
    }

    /// Convert into a plain [`std::result::Result`], keeping the first
    /// error.
    pub fn into_result(self) -> std::result::Result<(), IdentityError> {
        match self {
            IdentityResult::Success => Ok(()),
            IdentityResult::Failed(mut errors) => Err(if errors.is_empty() {
                IdentityError {
                    code: "Unknown".to_owned(),
                    description: "operation failed".to_owned(),
                }
            } else {
                errors.swap_remove(0)
            }),
        }
    }
}

impl From<Result<()>> for IdentityResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => IdentityResult::Success,
            Err(err) => IdentityResult::Failed(vec![IdentityError::from(&err)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_failure_becomes_result() {
        let err = DirectoryError::from(TableError::Storage("disk full".into()));
        let result = IdentityResult::from(Err(err));

        assert!(!result.succeeded());
        assert_eq!(result.errors()[0].code, "StorageError");
        assert_eq!(
            result.errors()[0].description,
            "storage failure: disk full"
        );

        let err = result.into_result().unwrap_err();
        assert_eq!(err.to_string(), "StorageError: storage failure: disk full");
    }

    #[test]
    fn test_success() {
        let result = IdentityResult::from(Ok(()));

        assert!(result.succeeded());
        assert!(result.errors().is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_invalid_argument_code() {
        let err = DirectoryError::invalid_argument("role", "must not be empty");

        assert_eq!(err.code(), "InvalidArgument");
        assert_eq!(err.to_string(), "invalid argument `role`: must not be empty");
    }
}
