use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("planner api error: http {status}{}", body_suffix(.body))]
    Http { status: u16, body: String },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl InfraError {
    /// Transport failures and transient server statuses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            InfraError::Network(_) => true,
            InfraError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

fn body_suffix(body: &str) -> String {
    if body.trim().is_empty() {
        String::new()
    } else {
        format!("; body={body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(InfraError::Network("connection reset".to_string()).is_retryable());
        assert!(InfraError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(InfraError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!InfraError::Http { status: 400, body: "bad".to_string() }.is_retryable());
        assert!(!InfraError::InvalidInput("title".to_string()).is_retryable());
    }

    #[test]
    fn http_error_message_includes_body_only_when_present() {
        let empty = InfraError::Http { status: 404, body: "  ".to_string() };
        assert_eq!(empty.to_string(), "planner api error: http 404");
        let detailed = InfraError::Http { status: 400, body: "{\"detail\":\"x\"}".to_string() };
        assert_eq!(
            detailed.to_string(),
            "planner api error: http 400; body={\"detail\":\"x\"}"
        );
    }
}
