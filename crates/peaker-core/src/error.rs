//! Error types for the core module

use thiserror::Error;

use crate::{ConfigError, TemplateError};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Template error for an account
    #[error("Template for account '{account}': {source}")]
    Template {
        /// Account the template was configured for
        account: String,
        /// Underlying template error
        #[source]
        source: TemplateError,
    },
}

