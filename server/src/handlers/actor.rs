use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::models::actor::{Actor, Role};
use crate::utils::error::AppError;

/// Set by the authentication layer in front of this service.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::AuthError(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::AuthError(format!("Malformed {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)?
            .trim()
            .parse::<Uuid>()
            .map_err(|_| AppError::AuthError("Actor id must be a UUID".to_string()))?;
        let role = header(parts, ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(AppError::AuthError)?;
        Ok(Actor::new(id, role))
    }
}
