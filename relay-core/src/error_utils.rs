use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

/// Classification and reporting helpers for relay errors.
pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Whether the same call may succeed if tried again later.
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    /// Message safe to show an operator in the admin UI.
    fn user_friendly_message(&self) -> String;
    /// Stable machine-readable code used in admin API responses.
    fn error_code(&self) -> &'static str;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        match self {
            CoreError::RedditApi(inner) => error!(code = self.error_code(), "{} ({:?})", self, inner),
            CoreError::Database(inner) => error!(code = self.error_code(), "{} ({:?})", self, inner),
            _ => error!(code = self.error_code(), "{}", self),
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = self.error_code(), "{}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(inner) => inner.is_retryable(),
            CoreError::Network(inner) => inner.is_timeout() || inner.is_connect(),
            CoreError::Database(DatabaseError::DatabaseLocked) => true,
            CoreError::Delivery(DeliveryError::HttpStatus { status_code }) => {
                *status_code == 429 || *status_code >= 500
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(inner) => inner.retry_after(),
            CoreError::Database(DatabaseError::DatabaseLocked) => Some(Duration::from_millis(100)),
            other if other.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(inner) => inner.user_friendly_message(),
            CoreError::Database(_) => "The relay database could not complete the request.".to_string(),
            CoreError::Media(MediaError::DownloadFailed { url, .. }) => {
                format!("Could not download media from {}", url)
            }
            CoreError::Media(_) => "No playable media URL could be found for the post.".to_string(),
            CoreError::Delivery(DeliveryError::Rejected { description }) => {
                format!("Telegram refused the post: {}", description)
            }
            CoreError::Delivery(_) => "Posting to the Telegram channel failed.".to_string(),
            CoreError::Config(ConfigError::MissingEnvironmentVariable { var_name }) => {
                format!("Set the required environment variables: {}", var_name)
            }
            CoreError::Config(inner) => format!("Configuration problem: {}", inner),
            CoreError::Network(_) => "Could not reach a remote service.".to_string(),
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::NotFound { resource } => format!("Not found: {}", resource),
            CoreError::RunInProgress { config_id } => format!(
                "A send is already running for config {} or its subreddit; try again when it finishes.",
                config_id
            ),
            CoreError::Io(_) | CoreError::Serialization(_) | CoreError::Internal { .. } => {
                "Something went wrong inside the relay.".to_string()
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(inner) => inner.error_code(),
            CoreError::Database(_) => "DATABASE",
            CoreError::Media(_) => "MEDIA",
            CoreError::Delivery(_) => "DELIVERY",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::RunInProgress { .. } => "RUN_IN_PROGRESS",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!(code = self.error_code(), "Reddit: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = self.error_code(), "Reddit: {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            RedditApiError::RateLimitExceeded { .. }
                | RedditApiError::Unavailable { .. }
                | RedditApiError::RequestTimeout
                | RedditApiError::ServerError { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after }
            | RedditApiError::Unavailable { retry_after } => Some(Duration::from_secs(*retry_after)),
            other if other.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit refused the app credentials; check REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET."
                    .to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => {
                format!("Reddit is rate limiting the relay; retry in {} seconds.", retry_after)
            }
            RedditApiError::Forbidden { resource } => {
                format!("Reddit denied access to {} (private or quarantined).", resource)
            }
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("r/{} does not exist or is private.", subreddit)
            }
            RedditApiError::InvalidToken => {
                "Reddit rejected the access token; it will be renewed.".to_string()
            }
            RedditApiError::RequestTimeout => "Reddit did not answer in time.".to_string(),
            RedditApiError::Unavailable { retry_after } => format!(
                "Reddit keeps failing, so requests are paused; retry in {} seconds.",
                retry_after
            ),
            RedditApiError::InvalidResponse { .. } | RedditApiError::ServerError { .. } => {
                "Reddit is having problems; try again later.".to_string()
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT",
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN",
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND",
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN",
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT",
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE",
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR",
            RedditApiError::Unavailable { .. } => "REDDIT_UNAVAILABLE",
        }
    }
}
