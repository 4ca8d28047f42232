use std::time::Duration;

/// One failed call to the accounting API, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 4xx other than 429. Never retried.
    #[error("accounting API rejected the request (HTTP {status}): {body}")]
    PermanentClient {
        status: u16,
        invalid_grant: bool,
        body: String,
    },

    #[error("accounting API rate limit hit (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("accounting API server error (HTTP {status}): {body}")]
    TransientServer { status: u16, body: String },

    #[error("accounting API transport error: {0}")]
    Transport(String),

    #[error("accounting API response could not be decoded: {0}")]
    Decode(String),
}

impl ApiError {
    /// Builds the error for a non-success status, reading `invalid_grant` out of the body.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::TransientServer { status, body },
            _ => Self::PermanentClient {
                status,
                invalid_grant: body.to_ascii_lowercase().contains("invalid_grant"),
                body,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::PermanentClient { status, .. } | Self::TransientServer { status, .. } => {
                Some(*status)
            }
            Self::RateLimited { .. } => Some(429),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// The stored credentials were revoked or expired; a re-issue is required.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(
            self,
            Self::PermanentClient {
                invalid_grant: true,
                ..
            }
        )
    }
}

/// A fetch that failed after retry handling, tagged with the endpoint it targeted.
#[derive(Debug, thiserror::Error)]
#[error("{endpoint} fetch failed: {source}")]
pub struct FetchError {
    pub endpoint: String,
    pub status: Option<u16>,
    #[source]
    pub source: ApiError,
}

impl FetchError {
    pub fn new(endpoint: impl Into<String>, source: ApiError) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: source.status(),
            source,
        }
    }

    pub fn requires_reauthorization(&self) -> bool {
        self.source.is_invalid_grant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_status() {
        assert!(matches!(
            ApiError::from_status(429, Some(Duration::from_secs(3)), String::new()),
            ApiError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            ApiError::from_status(503, None, "down".into()),
            ApiError::TransientServer { status: 503, .. }
        ));
        let grant = ApiError::from_status(400, None, r#"{"error":"invalid_grant"}"#.into());
        assert!(grant.is_invalid_grant());
        assert!(!ApiError::from_status(404, None, "nope".into()).is_invalid_grant());
    }

    #[test]
    fn fetch_error_carries_endpoint_and_status() {
        let err = FetchError::new(
            "Profit & Loss",
            ApiError::TransientServer {
                status: 503,
                body: "unavailable".into(),
            },
        );
        assert_eq!(err.status, Some(503));
        assert!(!err.requires_reauthorization());
        assert!(err.to_string().starts_with("Profit & Loss fetch failed"));
    }
}
