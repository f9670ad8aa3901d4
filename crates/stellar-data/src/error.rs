//! Error types for the catalog engine

use stellar_core::ElementParseError;
use thiserror::Error;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised by identity resolution, reduction and normalization.
///
/// "Not found" is never an error here; resolvers and stores return
/// explicit outcomes for that.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("external resolver failed after {attempts} attempts: {message}")]
    ResolverExhausted { attempts: u32, message: String },

    #[error("external resolver error: {0}")]
    Resolver(String),

    #[error("names {names:?} resolve to more than one external id: {ids:?}")]
    AmbiguousIdentity { names: Vec<String>, ids: Vec<String> },

    #[error("reference {reference:?} for parameter {param:?} is not in the ranking table")]
    UnrankedReference { param: String, reference: String },

    #[error("catalog {catalog:?} is already normalized to scale {scale:?}")]
    AlreadyNormalized { catalog: String, scale: String },

    #[error("unknown normalization scale: {0}")]
    UnknownScale(String),

    #[error("identity {0:?} already exists")]
    DuplicateKey(String),

    #[error("alias {alias:?} already belongs to identity {owner:?}")]
    AliasConflict { alias: String, owner: String },

    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error("identity {0:?} must have at least one alias")]
    EmptyAliases(String),

    #[error("catalog {catalog:?}: {message}")]
    CatalogFormat { catalog: String, message: String },

    #[error("element error: {0}")]
    Element(#[from] ElementParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Transient failures are worth retrying against the external service.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            CatalogError::Resolver(_) | CatalogError::Io(_) => true,
            _ => false,
        }
    }

    pub(crate) fn format(catalog: &str, message: impl Into<String>) -> Self {
        CatalogError::CatalogFormat { catalog: catalog.to_string(), message: message.into() }
    }
}
