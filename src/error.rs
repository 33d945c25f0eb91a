//! Error types for the inventory application
//!
//! Every fallible operation in the crate returns [`InventoryError`]. None of
//! these are fatal: the HTTP layer turns each one into a user-facing notice.

use crate::storage::StorageError;

/// Main inventory error type
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// One or more required fields are missing or invalid
    #[error("missing or invalid field(s): {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    /// Signup password and its confirmation differ
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Signup with an e-mail address that is already registered
    #[error("a user with email {0} already exists")]
    DuplicateUser(String),

    /// Login with no matching email/password pair
    #[error("invalid login details")]
    Auth,

    /// Persisted payload, backup or spreadsheet bytes are malformed
    #[error("decode error: {0}")]
    Decode(String),

    /// The persistence backend rejected a read or write
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No product id is left below [`crate::catalog::MAX_PRODUCT_ID`]
    #[error("product ids exhausted")]
    IdsExhausted,

    /// Spreadsheet generation failed
    #[error("export failed: {0}")]
    Export(String),

    /// Password hashing failed
    #[error("password hashing failed")]
    Hash,

    /// Bad command-line configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl InventoryError {
    /// Names of the offending fields for a validation failure, empty otherwise.
    pub fn fields(&self) -> &[&'static str] {
        match self {
            InventoryError::Validation(fields) => fields,
            _ => &[],
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for InventoryError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        InventoryError::Export(e.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, InventoryError>;
