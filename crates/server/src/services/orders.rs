//! Order placement.
//!
//! [`OrderService::create_order`] runs one transaction per order:
//!
//! 1. lock and read every requested product, in request order
//! 2. check stock, currency and line totals against the locked rows
//! 3. insert the order with price snapshots of every line
//! 4. decrement stock with a guarded update per line
//! 5. commit
//!
//! Any failure returns before step 5 and drops the transaction, which rolls
//! back every write. Placement never touches the product cache; stock is
//! only ever trusted from the locked rows.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use marketplace_core::{CurrencyCode, OrderId, OrderStatus, Price, UserId};

use super::error::{Entity, InfrastructureError, NotFoundExt, ServiceError};
use crate::db::{Decrement, OrderStore, StoreTransaction};
use crate::models::{Actor, NewOrder, NewOrderItem, OrderLine, OrderWithItems};

/// Longest note accepted on an order, in characters.
pub const MAX_NOTE_LENGTH: usize = 1000;

/// Order placement and retrieval.
#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
    transaction_timeout: Duration,
}

impl<S: OrderStore> OrderService<S> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: S, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    /// Place an order for `buyer`.
    ///
    /// Either the order, its items and every stock decrement are committed
    /// together, or nothing is.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty order, a non-positive quantity, a note
    ///   that is too long, or a total that overflows
    /// - `NotFound` if a product is missing or soft-deleted
    /// - `InsufficientStock` if a line asks for more than is available
    /// - `MixedCurrency` if the products are priced in different currencies
    /// - `Infrastructure` if the store fails or the transaction times out
    #[instrument(skip_all, fields(buyer_id = %buyer, lines = lines.len()))]
    pub async fn create_order(
        &self,
        buyer: UserId,
        lines: &[OrderLine],
        note: Option<String>,
    ) -> Result<OrderId, ServiceError> {
        validate_request(lines, note.as_deref())?;

        match tokio::time::timeout(self.transaction_timeout, self.place(buyer, lines, note)).await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout = ?self.transaction_timeout,
                    "order transaction timed out, rolled back"
                );
                Err(InfrastructureError::Timeout(self.transaction_timeout).into())
            }
        }
    }

    async fn place(
        &self,
        buyer: UserId,
        lines: &[OrderLine],
        note: Option<String>,
    ) -> Result<OrderId, ServiceError> {
        let mut tx = self.store.begin().await.inspect_err(|e| {
            error!(error = %e, "failed to begin order transaction");
        })?;

        let mut currency: Option<CurrencyCode> = None;
        let mut total: Option<Price> = None;
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let product = tx
                .locked_get_product(line.product_id)
                .await
                .or_not_found(Entity::Product, line.product_id)?;

            if product.quantity < line.quantity {
                return Err(ServiceError::InsufficientStock {
                    product_id: product.id,
                    name: product.name,
                    available: product.quantity,
                    requested: line.quantity,
                });
            }

            let unit_price = product.unit_price();
            let order_currency = *currency.get_or_insert(unit_price.currency_code);
            if unit_price.currency_code != order_currency {
                return Err(ServiceError::MixedCurrency {
                    product_id: product.id,
                    expected: order_currency,
                    found: unit_price.currency_code,
                });
            }

            let line_total = unit_price.checked_times(line.quantity).ok_or_else(|| {
                ServiceError::invalid(format!("line total overflows for product {}", product.id))
            })?;
            total = Some(match total {
                None => line_total,
                Some(running) => running
                    .checked_add(&line_total)
                    .ok_or_else(|| ServiceError::invalid("order total overflows"))?,
            });

            items.push(NewOrderItem {
                product_id: product.id,
                name: product.name,
                sku: product.sku,
                unit_price: unit_price.amount,
                quantity: line.quantity,
                total_price: line_total.amount,
            });
        }

        let total =
            total.ok_or_else(|| ServiceError::invalid("order must contain at least one item"))?;
        let order = NewOrder {
            buyer_id: buyer,
            total: total.amount,
            currency: total.currency_code,
            status: OrderStatus::Pending,
            note,
        };

        let order_id = tx
            .create_order_with_items(&order, &items)
            .await
            .inspect_err(|e| error!(error = %e, "failed to insert order rows"))
            .map_err(ServiceError::in_transaction)?;

        for item in &items {
            let outcome = tx
                .conditional_decrement(item.product_id, item.quantity)
                .await
                .inspect_err(|e| {
                    error!(product_id = %item.product_id, error = %e, "failed to decrement stock");
                })
                .map_err(ServiceError::in_transaction)?;

            if outcome == Decrement::Insufficient {
                // Same product on several lines: earlier decrements in this
                // transaction are visible to the locked read.
                let available = tx
                    .locked_get_product(item.product_id)
                    .await
                    .map_or(0, |p| p.quantity);
                warn!(
                    product_id = %item.product_id,
                    available,
                    requested = item.quantity,
                    "stock guard rejected decrement"
                );
                return Err(ServiceError::InsufficientStock {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    available,
                    requested: item.quantity,
                });
            }
        }

        tx.commit()
            .await
            .inspect_err(|e| error!(%order_id, error = %e, "failed to commit order"))
            .map_err(ServiceError::in_transaction)?;

        info!(%order_id, total = %total, "order placed");
        Ok(order_id)
    }

    /// Get an order and its items.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the order is missing or
    /// soft-deleted, `InvalidInput` for a non-positive id.
    #[instrument(skip_all, fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId) -> Result<OrderWithItems, ServiceError> {
        if !id.is_valid() {
            return Err(ServiceError::invalid("order id must be positive"));
        }
        let (order, items) = self
            .store
            .get_order(id)
            .await
            .or_not_found(Entity::Order, id)?;
        Ok(OrderWithItems { order, items })
    }

    /// Get an order on behalf of `actor`, who must be its buyer or an admin.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_order`], plus `PermissionDenied` for any other
    /// caller.
    pub async fn get_order_for(
        &self,
        actor: &Actor,
        id: OrderId,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = self.get_order(id).await?;
        if actor.is_admin() || order.order.buyer_id == actor.user_id {
            return Ok(order);
        }
        Err(ServiceError::PermissionDenied(format!(
            "order {id} belongs to another user"
        )))
    }

    /// Check that the backing store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Infrastructure` if it is not.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.store.ping().await?;
        Ok(())
    }
}

fn validate_request(lines: &[OrderLine], note: Option<&str>) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::invalid("order must contain at least one item"));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
        return Err(ServiceError::invalid(format!(
            "quantity for product {} must be positive",
            line.product_id
        )));
    }
    if note.is_some_and(|n| n.chars().count() > MAX_NOTE_LENGTH) {
        return Err(ServiceError::invalid(format!(
            "note must be at most {MAX_NOTE_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::ProductId;

    use super::*;

    fn line(product: i64, quantity: i32) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    #[test]
    fn test_rejects_empty_order() {
        assert!(matches!(
            validate_request(&[], None),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        assert!(validate_request(&[line(1, 0)], None).is_err());
        assert!(validate_request(&[line(1, 2), line(2, -1)], None).is_err());
        assert!(validate_request(&[line(1, 2)], None).is_ok());
    }

    #[test]
    fn test_note_length_counts_characters() {
        let at_limit = "é".repeat(MAX_NOTE_LENGTH);
        assert!(validate_request(&[line(1, 1)], Some(&at_limit)).is_ok());
        let over = "a".repeat(MAX_NOTE_LENGTH + 1);
        assert!(validate_request(&[line(1, 1)], Some(&over)).is_err());
    }
}
