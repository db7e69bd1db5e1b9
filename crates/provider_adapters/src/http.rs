//! Shared HTTP plumbing for provider gateways
//!
//! Every gateway call goes out with a bounded timeout; a timeout is mapped
//! to `GatewayError::Unavailable` because the true outcome is unknown and
//! the caller must be told the operation is retryable.

use domain_payments::GatewayError;
use tracing::warn;

/// Maps a transport-level failure to the canonical taxonomy
pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        return GatewayError::Unavailable(format!("{provider}: request timed out"));
    }
    if error.is_connect() {
        return GatewayError::Unavailable(format!("{provider}: connection failed"));
    }
    GatewayError::Unavailable(format!("{provider}: {error}"))
}

/// Maps a non-success HTTP response to the canonical taxonomy
///
/// Consumes the response body; provider error detail is folded into the
/// message but never parsed beyond a best-effort code extraction.
pub(crate) async fn response_error(provider: &str, response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let code = extract_error_code(&body).unwrap_or_else(|| format!("http_{}", status.as_u16()));
    let message = truncate(&body, 500);

    warn!(provider, status = status.as_u16(), code = %code, "provider returned an error response");

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return GatewayError::Auth(format!("{provider}: credentials rejected ({code})"));
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::Unavailable(format!("{provider}: {code}"));
    }
    GatewayError::Rejected { code, message }
}

/// Best-effort extraction of a provider error code from a JSON body
fn extract_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["code", "error_code", "error", "descripcionError"] {
        if let Some(code) = value.get(key).and_then(|v| v.as_str()) {
            return Some(code.to_string());
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_code() {
        assert_eq!(
            extract_error_code(r#"{"code":"card_declined","message":"nope"}"#),
            Some("card_declined".to_string())
        );
        assert_eq!(
            extract_error_code(r#"{"descripcionError":"CuentaInvalida"}"#),
            Some("CuentaInvalida".to_string())
        );
        assert_eq!(extract_error_code("not json"), None);
    }
}
