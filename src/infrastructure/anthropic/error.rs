/// HTTP status classification for the Anthropic Messages API
use crate::domain::ports::{LimitType, ProviderError};

/// Map a non-success status and its body to a classified error.
///
/// 500 and 529 share the overload class: both indicate capacity
/// pressure on the provider side and retry on the same schedule.
pub fn classify_status(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::Throttled {
            limit_type: parse_limit_type(&body),
            message: body,
        },
        500 | 529 => ProviderError::Overloaded(body),
        400 => ProviderError::InvalidRequest(body),
        401 | 403 => ProviderError::AuthenticationFailed(body),
        _ => ProviderError::Api { status, body },
    }
}

/// Best-effort extraction of which quota a 429 exhausted.
fn parse_limit_type(body: &str) -> LimitType {
    let lower = body.to_lowercase();
    if lower.contains("token") {
        LimitType::Tokens
    } else if lower.contains("request") {
        LimitType::Requests
    } else {
        LimitType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_classified_as_throttled() {
        let err = classify_status(429, "rate_limit_error: request cap".to_string());
        match err {
            ProviderError::Throttled { limit_type, .. } => {
                assert_eq!(limit_type, LimitType::Requests);
            }
            other => panic!("Expected Throttled, got {other:?}"),
        }
    }

    #[test]
    fn test_429_token_limit_detected() {
        let err = classify_status(429, "input tokens per minute exceeded".to_string());
        match err {
            ProviderError::Throttled { limit_type, .. } => {
                assert_eq!(limit_type, LimitType::Tokens);
            }
            other => panic!("Expected Throttled, got {other:?}"),
        }
    }

    #[test]
    fn test_429_unknown_limit() {
        let err = classify_status(429, "slow down".to_string());
        match err {
            ProviderError::Throttled { limit_type, .. } => {
                assert_eq!(limit_type, LimitType::Unknown);
            }
            other => panic!("Expected Throttled, got {other:?}"),
        }
    }

    #[test]
    fn test_overload_class_covers_500_and_529() {
        assert!(classify_status(529, "overloaded_error".to_string()).is_overloaded());
        assert!(classify_status(500, "internal server error".to_string()).is_overloaded());
    }

    #[test]
    fn test_permanent_statuses() {
        assert!(matches!(
            classify_status(400, "bad".to_string()),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_status(401, "no".to_string()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_status(404, "gone".to_string()),
            ProviderError::Api { status: 404, .. }
        ));
    }
}
