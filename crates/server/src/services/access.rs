//! Owner-or-admin authorization for catalog mutations.

use super::ServiceError;
use crate::models::{Actor, Shop};

/// Allow the change if `actor` is an admin or owns `shop`.
///
/// Callers load the shop first, so a missing record is reported as
/// `NotFound` before ownership is considered.
///
/// # Errors
///
/// Returns `ServiceError::PermissionDenied` otherwise.
pub fn ensure_can_modify(actor: &Actor, shop: &Shop) -> Result<(), ServiceError> {
    if actor.is_admin() || shop.owner_id == actor.user_id {
        return Ok(());
    }
    Err(ServiceError::PermissionDenied(format!(
        "user {} does not own shop {}",
        actor.user_id, shop.id
    )))
}
