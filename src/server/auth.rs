use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::state::AppState;
use crate::error::ApiError;

/// Compares without short-circuiting on the first differing byte.
pub fn password_matches(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Guards the admin routes. An empty `admin_password` disables the check.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.settings.auth_enabled() {
        return Ok(next.run(request).await);
    }

    let authorized = bearer_token(&request)
        .is_some_and(|token| password_matches(token, &state.settings.admin_password));
    if !authorized {
        warn!("Rejected admin request to {}", request.uri().path());
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_comparison() {
        assert!(password_matches("hunter2", "hunter2"));
        assert!(!password_matches("hunter3", "hunter2"));
        assert!(!password_matches("hunter", "hunter2"));
        assert!(!password_matches("", "hunter2"));
    }
}
