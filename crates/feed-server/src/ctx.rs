use crate::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Verified caller identity, placed in request extensions by `mw_require_auth`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctx {
    user_id: String,
    display_name: Option<String>,
}

impl Ctx {
    pub fn new(user_id: String, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        // Only present behind the auth middleware
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or_else(Error::unauthenticated)
    }
}
