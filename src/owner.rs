use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use uuid::Uuid;

use crate::state::AppState;

/// Owner identity, injected by the upstream gateway as an `x-user-id` header.
/// Token mechanics live outside this service; handlers receive the owner as an
/// explicit argument rather than ambient state.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for OwnerId {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing x-user-id header".into()))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid x-user-id header".into()))?;

        Ok(OwnerId(user_id))
    }
}
