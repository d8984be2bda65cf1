use crate::auth::token::TokenCodec;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Resolve a raw `Authorization` header value into the caller's identity.
///
/// Every failure (missing header, wrong scheme, bad or expired token) is
/// reported as the same `Unauthenticated` error; the reason is only logged.
pub fn authenticate(tokens: &TokenCodec, auth_header: Option<&str>) -> Result<Ctx> {
    let Some(auth_header) = auth_header else {
        debug!("[Auth] no authorization header");
        return Err(Error::unauthenticated());
    };

    // Format: "Bearer <token>"
    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        debug!("[Auth] authorization header without bearer scheme");
        return Err(Error::unauthenticated());
    };

    let token = token.trim();
    if token.is_empty() {
        debug!("[Auth] empty bearer token");
        return Err(Error::unauthenticated());
    }

    let claims = tokens.verify(token).map_err(|e| {
        debug!("[Auth] token rejected: {}", e);
        Error::unauthenticated()
    })?;

    Ok(Ctx::new(claims.sub, claims.name))
}

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(h) => Some(h.to_str().map_err(|_| Error::unauthenticated())?),
        None => None,
    };

    let ctx = authenticate(&state.tokens, auth_header)?;

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}
