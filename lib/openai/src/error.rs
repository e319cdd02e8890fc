use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    Request(String),
    #[error("api error, status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Stream(String),
}

impl ChatError {
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Network(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Yes,
    No,
    Unknown,
}

// short user-visible stand-in for a failed exchange, rendered inline as [[text]]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    pub text: String,
    pub retry: Retry,
}

impl Sentinel {
    fn fixed(text: &str, retry: Retry) -> Self {
        Sentinel {
            text: text.to_string(),
            retry,
        }
    }
}

// total: every upstream failure maps to a sentinel, nothing propagates further
pub fn classify(error: &ChatError) -> Sentinel {
    match error {
        ChatError::Request(_) => Sentinel::fixed("bad request", Retry::No),
        ChatError::Api {
            status: 500 | 503 | 504,
            ..
        } => Sentinel::fixed("service unavailable", Retry::Yes),
        ChatError::Api { status: 429, .. } => Sentinel::fixed("too many requests", Retry::Yes),
        ChatError::Api { status: 401, .. } => Sentinel::fixed("unauthorized", Retry::No),
        ChatError::Api { .. } => Sentinel::fixed("bad request", Retry::No),
        ChatError::Timeout => Sentinel::fixed("request timed out", Retry::Yes),
        ChatError::Network(message) | ChatError::Stream(message) => Sentinel {
            text: message.clone(),
            retry: Retry::Unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16) -> ChatError {
        ChatError::Api {
            status,
            message: "upstream".to_string(),
        }
    }

    #[test]
    fn status_codes_map_to_stable_sentinels() {
        for status in [500, 503, 504] {
            assert_eq!(classify(&api_error(status)), Sentinel::fixed("service unavailable", Retry::Yes));
        }
        assert_eq!(classify(&api_error(429)), Sentinel::fixed("too many requests", Retry::Yes));
        assert_eq!(classify(&api_error(401)), Sentinel::fixed("unauthorized", Retry::No));
        assert_eq!(classify(&api_error(400)), Sentinel::fixed("bad request", Retry::No));
        assert_eq!(classify(&api_error(418)), Sentinel::fixed("bad request", Retry::No));
    }

    #[test]
    fn timeout_and_request_errors_classify() {
        assert_eq!(classify(&ChatError::Timeout), Sentinel::fixed("request timed out", Retry::Yes));
        assert_eq!(
            classify(&ChatError::Request("bad shape".to_string())),
            Sentinel::fixed("bad request", Retry::No)
        );
    }

    #[test]
    fn unknown_errors_keep_the_raw_message() {
        let sentinel = classify(&ChatError::Network("connection reset".to_string()));
        assert_eq!(sentinel.text, "connection reset");
        assert_eq!(sentinel.retry, Retry::Unknown);
    }

    #[test]
    fn classification_is_idempotent() {
        let error = api_error(429);
        assert_eq!(classify(&error), classify(&error));
    }
}
