//! Session identity
//!
//! Login happens outside the ledger. The session layer in front of it
//! forwards the logged-in address in the `x-actor-address` header; the role
//! always comes from the registry, never from the request.

use agrichain_core::Address;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::error::ApiError;

/// Header carrying the logged-in actor address
pub const ACTOR_HEADER: &str = "x-actor-address";

/// Address of the logged-in actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionActor(pub Address);

impl<S> FromRequestParts<S> for SessionActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or(ApiError::MissingIdentity)?;
        let address = value
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("{} is not valid text", ACTOR_HEADER)))?
            .trim();
        if address.is_empty() {
            return Err(ApiError::MissingIdentity);
        }
        Ok(SessionActor(Address::new(address)))
    }
}
