use relay_core::{
    ConfigError, CoreError, DatabaseError, DeliveryError, ErrorExt, MediaError, RedditApiError,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_INVALID_TOKEN");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let media_error = CoreError::Media(MediaError::ResolutionFailed {
        post_id: "abc".to_string(),
        reason: "lookup returned 404".to_string(),
    });
    assert_eq!(media_error.error_code(), "MEDIA");

    let delivery_error = CoreError::Delivery(DeliveryError::Rejected {
        description: "chat not found".to_string(),
    });
    assert_eq!(delivery_error.error_code(), "DELIVERY");

    let busy = CoreError::RunInProgress { config_id: 4 };
    assert_eq!(busy.error_code(), "RUN_IN_PROGRESS");
}

#[test]
fn test_retryable_errors() {
    let retryable_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable_error.is_retryable());

    let server_error = CoreError::Delivery(DeliveryError::HttpStatus { status_code: 502 });
    assert!(server_error.is_retryable());

    let rejected = CoreError::Delivery(DeliveryError::HttpStatus { status_code: 400 });
    assert!(!rejected.is_retryable());

    let non_retryable_error = CoreError::Config(ConfigError::InvalidValue {
        field: "FETCH_LIMIT".to_string(),
        value: "0".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let locked = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(locked.retry_after(), Some(Duration::from_millis(100)));

    let outage = CoreError::RedditApi(RedditApiError::Unavailable { retry_after: 25 });
    assert!(outage.is_retryable());
    assert_eq!(outage.retry_after(), Some(Duration::from_secs(25)));
    assert_eq!(outage.error_code(), "REDDIT_UNAVAILABLE");
    assert!(outage.user_friendly_message().contains("25 seconds"));

    let not_found = CoreError::NotFound {
        resource: "config 9".to_string(),
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    let message = reddit_error.user_friendly_message();
    assert!(message.contains("rejected the access token"));

    let missing = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "TELEGRAM_BOT_TOKEN".to_string(),
    });
    assert!(missing.user_friendly_message().contains("TELEGRAM_BOT_TOKEN"));

    let busy = CoreError::RunInProgress { config_id: 7 };
    assert!(busy.user_friendly_message().contains("config 7"));
}

#[test]
fn test_display_names_the_failing_system() {
    let missing = CoreError::RedditApi(RedditApiError::SubredditNotFound {
        subreddit: "nope".to_string(),
    });
    assert_eq!(missing.to_string(), "Reddit: r/nope does not exist or is private");

    let rejected = CoreError::Delivery(DeliveryError::Rejected {
        description: "Bad Request: chat not found".to_string(),
    });
    assert_eq!(
        rejected.to_string(),
        "Telegram: message rejected: Bad Request: chat not found"
    );
}

#[test]
fn test_logging_does_not_panic() {
    let error = CoreError::RedditApi(RedditApiError::InvalidToken);
    error.log_error();
    error.log_warn();
}
