//! Error types for the verification and account workflows.

use thiserror::Error;

use crate::dispatch::Undelivered;

/// What was wrong with a caller-supplied field.
///
/// Every kind maps to a validation-style response rather than a server
/// fault. Expired, already-used and mistyped codes are all `InvalidCode`,
/// so a caller cannot learn when a code was issued or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    EmailEmpty,
    EmailInvalid,
    PasswordTooShort,
    NameEmpty,
    PasswordEmpty,
    PasswordMismatch,
    InvalidCode,
}

impl ValidationKind {
    /// Stable numeric code exposed to clients
    pub fn code(self) -> u32 {
        match self {
            ValidationKind::EmailEmpty => 1,
            ValidationKind::EmailInvalid => 1 << 1,
            ValidationKind::PasswordTooShort => 1 << 2,
            ValidationKind::NameEmpty => 1 << 3,
            ValidationKind::PasswordEmpty => 1 << 4,
            ValidationKind::PasswordMismatch => 1 << 7,
            ValidationKind::InvalidCode => 1 << 9,
        }
    }

    /// Human-readable message
    pub fn message(self) -> &'static str {
        match self {
            ValidationKind::EmailEmpty => "email is empty",
            ValidationKind::EmailInvalid => "email is invalid",
            ValidationKind::PasswordTooShort => "password must be at least 6 characters long",
            ValidationKind::NameEmpty => "name is empty",
            ValidationKind::PasswordEmpty => "password is empty",
            ValidationKind::PasswordMismatch => "password confirmation does not match",
            ValidationKind::InvalidCode => "code is invalid",
        }
    }
}

/// A rejected input field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {}", .kind.message())]
pub struct ValidationError {
    /// Name of the offending field, as the client sent it
    pub field: &'static str,
    pub kind: ValidationKind,
}

impl ValidationError {
    pub fn new(field: &'static str, kind: ValidationKind) -> Self {
        Self { field, kind }
    }

    /// The error every unusable verification code produces
    pub fn invalid_code() -> Self {
        Self::new("code", ValidationKind::InvalidCode)
    }
}

/// Failures reported by the durable user store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// An account with this email already exists
    #[error("account already exists")]
    AlreadyExists,

    /// No account matched the lookup
    #[error("account not found")]
    NotFound,

    /// The backend failed (connection, query, constraint...)
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure reported by the credential hasher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("credential hashing failed: {0}")]
pub struct CredentialError(pub String);

/// Errors that can occur in the verification and account workflows.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The durable store failed; delivered as the store reported it
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Password hashing failed
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A dispatched operation ended without delivering its result
    #[error(transparent)]
    Undelivered(#[from] Undelivered),
}

impl Error {
    /// Returns `true` for errors caused by caller input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Returns `true` if a verification code was rejected.
    pub fn is_invalid_code(&self) -> bool {
        matches!(
            self,
            Error::Validation(ValidationError {
                kind: ValidationKind::InvalidCode,
                ..
            })
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
