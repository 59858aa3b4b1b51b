//! Service error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use marketplace_core::{CurrencyCode, ProductId};

use crate::db::RepositoryError;

/// Kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Product,
    Shop,
    Order,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Shop => write!(f, "shop"),
            Self::Order => write!(f, "order"),
        }
    }
}

/// Failures outside the caller's control.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Store failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The order transaction did not finish in time and was rolled back.
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by the marketplace services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested record does not exist or is soft-deleted.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// Request failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough units in stock to fill a line.
    #[error(
        "insufficient stock for product {product_id} ({name}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        available: i32,
        requested: i32,
    },

    /// Order lines are priced in different currencies.
    #[error(
        "all items in an order must share one currency: expected {expected}, product {product_id} is priced in {found}"
    )]
    MixedCurrency {
        product_id: ProductId,
        expected: CurrencyCode,
        found: CurrencyCode,
    },

    /// Actor is neither an admin nor the owner.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Store failure or timeout.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),
}

impl ServiceError {
    /// Shorthand for [`ServiceError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` for failures the caller cannot fix by changing the request.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// Classify a store failure raised inside the order transaction.
    ///
    /// Every failure there is an infrastructure failure, constraint
    /// conflicts included: the request itself was already validated against
    /// locked rows.
    pub(crate) const fn in_transaction(err: RepositoryError) -> Self {
        Self::Infrastructure(InfrastructureError::Repository(err))
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::InvalidInput(message),
            other => Self::Infrastructure(InfrastructureError::Repository(other)),
        }
    }
}

/// Maps a store-level `NotFound` to [`ServiceError::NotFound`] for a named record.
pub trait NotFoundExt<T> {
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for a missing record, otherwise the
    /// converted repository error.
    fn or_not_found(self, entity: Entity, id: impl Into<i64>) -> Result<T, ServiceError>;
}

impl<T> NotFoundExt<T> for Result<T, RepositoryError> {
    fn or_not_found(self, entity: Entity, id: impl Into<i64>) -> Result<T, ServiceError> {
        self.map_err(|e| match e {
            RepositoryError::NotFound => ServiceError::NotFound {
                entity,
                id: id.into(),
            },
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_record() {
        let result: Result<(), RepositoryError> = Err(RepositoryError::NotFound);
        let err = result
            .or_not_found(Entity::Product, ProductId::new(12))
            .unwrap_err();
        assert_eq!(err.to_string(), "product 12 not found");
    }

    #[test]
    fn test_conflict_becomes_invalid_input() {
        let err = ServiceError::from(RepositoryError::Conflict("shop 3 does not exist".into()));
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn test_conflict_inside_transaction_is_infrastructure() {
        let err = ServiceError::in_transaction(RepositoryError::Conflict(
            "order_items_quantity_check".into(),
        ));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_database_error_is_infrastructure() {
        let err = ServiceError::from(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = ServiceError::InsufficientStock {
            product_id: ProductId::new(1),
            name: "Green tea".to_owned(),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for product 1 (Green tea): available 2, requested 3"
        );
    }
}
