use thiserror::Error;

/// Errors produced by the tree's public operations.
///
/// Every fallible operation either completes fully or leaves the tree
/// unchanged; none of these variants are raised mid-mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("key already exists in the tree")]
    DuplicateKey,

    #[error("key not found in the tree")]
    NotFound,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
