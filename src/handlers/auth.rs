//! Bearer-token authentication for the asset API.

use crate::{errors::AppError, models::UserId, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// The authenticated caller. Extracting it rejects the request with
/// `Unauthenticated` when the bearer token is missing or unknown.
#[derive(Clone, Copy, Debug)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Bearer token from the Authorization header. The scheme is
/// case-insensitive (RFC 6750).
fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)
            .ok_or_else(|| AppError::Unauthenticated("missing bearer token".into()))?;
        let user_id = state.identity.authenticate(token).await?;
        Ok(Self { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/v1/assets");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert_eq!(extract_bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(extract_bearer_token(&parts(Some("bEaReR abc"))), Some("abc"));
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert_eq!(extract_bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(extract_bearer_token(&parts(Some("Bearer"))), None);
        assert_eq!(extract_bearer_token(&parts(None)), None);
    }
}
