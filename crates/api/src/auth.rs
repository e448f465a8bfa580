//! Shared-token authentication extractor.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    #[serde(rename = "authToken")]
    auth_token: Option<String>,
    auth: Option<String>,
}

impl TokenQuery {
    /// First non-empty of `authToken`, `auth`.
    fn token(&self) -> &str {
        [&self.auth_token, &self.auth]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.is_empty())
            .unwrap_or("")
    }
}

/// Proof that the request carried the configured access token in its
/// `authToken` (or `auth`) query parameter.
///
/// ```ignore
/// async fn handler(_auth: RequireToken) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireToken;

impl FromRequestParts<AppState> for RequireToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        if tokens_match(query.token(), &state.config.accept_token) {
            Ok(RequireToken)
        } else {
            let request_id = crate::request_id(&parts.headers);
            tracing::info!(request_id = %request_id, path = %parts.uri.path(), "Request unauthorized");
            Err(AppError::Unauthorized)
        }
    }
}

/// Compare fixed-size digests so timing does not depend on where the
/// supplied token first differs.
fn tokens_match(supplied: &str, expected: &str) -> bool {
    let a = Sha256::digest(supplied.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
