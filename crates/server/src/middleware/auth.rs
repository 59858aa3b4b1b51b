//! Caller identity forwarded by the upstream gateway.
//!
//! The gateway authenticates the request and sets `x-user-id` and
//! `x-user-role`. Requests without them are rejected with 401.

use axum::{extract::FromRequestParts, http::request::Parts};

use marketplace_core::{Role, UserId};

use crate::error::AppError;
use crate::models::Actor;

/// Header carrying the authenticated user's ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extractor that requires an authenticated caller.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireActor(actor): RequireActor) -> String {
///     format!("Hello, user {}!", actor.user_id)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireActor(pub Actor);

impl<S> FromRequestParts<S> for RequireActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?
            .parse::<UserId>()
            .map_err(|e| AppError::Unauthorized(format!("{USER_ID_HEADER}: {e}")))?;

        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ROLE_HEADER} header")))?
            .parse::<Role>()
            .map_err(AppError::Unauthorized)?;

        sentry::configure_scope(|scope| {
            scope.set_user(Some(sentry::User {
                id: Some(user_id.to_string()),
                ..Default::default()
            }));
        });

        Ok(Self(Actor::new(user_id, role)))
    }
}
