//! Error taxonomy for the caller-facing operations.
use thiserror::Error;

/// Failures of the price adjustment flow.
///
/// Input validation fails before any remote call; listing failures past the
/// first page end pagination instead of raising, so they never surface here.
#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("{0}")]
    InvalidScope(String),
    #[error("No products found for the selected scope")]
    NoItemsFound,
    #[error("product listing failed: {0}")]
    RemoteQuery(String),
}

/// Failures of the subscription operations.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("No subscription found")]
    NotSubscribed,
    /// Remote-reported user errors, message text joined from all of them.
    #[error("{0}")]
    Remote(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
