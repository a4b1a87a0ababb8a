//! Caller identity extraction.
//!
//! Credential verification happens upstream of this service (a gateway or
//! auth proxy). Every request arrives with an already-verified identity in
//! trusted headers; this module only lifts those headers into typed request
//! extensions and enforces the admin/non-admin split.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Header carrying the verified caller's user ID (UUID).
pub const USER_ID_HEADER: &str = "x-depot-user-id";

/// Header flagging an admin caller ("true"/"1").
pub const ADMIN_HEADER: &str = "x-depot-admin";

/// Verified caller identity, injected by the auth middleware.
#[derive(Clone, Debug)]
pub struct CallerIdentity {
    /// The caller's user ID.
    pub user_id: Uuid,
    /// Whether the upstream verified this caller as an administrator.
    pub is_admin: bool,
}

impl CallerIdentity {
    /// Require the admin flag, failing with Forbidden otherwise.
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "administrator access required".to_string(),
            ))
        }
    }
}

/// Middleware that parses the identity headers into a [`CallerIdentity`]
/// extension. Requests without a user ID pass through unauthenticated;
/// handlers that need identity call [`require_identity`].
pub async fn identity_middleware(mut req: Request, next: Next) -> Response {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());

    if let Some(user_id) = user_id {
        let is_admin = req
            .headers()
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "true" || v == "1");
        req.extensions_mut()
            .insert(CallerIdentity { user_id, is_admin });
    }

    next.run(req).await
}

/// Get the verified caller identity, failing with Unauthorized when the
/// gateway supplied none.
pub fn require_identity(req_extensions: &axum::http::Extensions) -> ApiResult<&CallerIdentity> {
    req_extensions.get::<CallerIdentity>().ok_or_else(|| {
        ApiError::Unauthorized("missing verified caller identity".to_string())
    })
}
