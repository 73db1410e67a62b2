//! Error taxonomy shared by every crate in the relay.
//!
//! Pipeline failure classes map onto these as follows: a failed listing
//! fetch is a `RedditApi` or `Network` error and aborts the run; `Media`
//! and `Delivery` errors skip one candidate; `Database` errors on the
//! ledger or config store fail the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Store: {0}")]
    Database(#[from] DatabaseError),

    #[error("Media: {0}")]
    Media(#[from] MediaError),

    #[error("Telegram: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP transport: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{resource} does not exist")]
    NotFound { resource: String },

    #[error("config {config_id} or its subreddit is already being dispatched")]
    RunInProgress { config_id: i64 },

    #[error("{message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("could not obtain an app token: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("rate limited for {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("access to {resource} is forbidden")]
    Forbidden { resource: String },

    #[error("r/{subreddit} does not exist or is private")]
    SubredditNotFound { subreddit: String },

    #[error("access token was rejected")]
    InvalidToken,

    #[error("request timed out")]
    RequestTimeout,

    #[error("unexpected response: {details}")]
    InvalidResponse { details: String },

    #[error("HTTP {status_code} from Reddit")]
    ServerError { status_code: u16 },

    #[error("Reddit is unavailable after repeated failures; retry in {retry_after}s")]
    Unavailable { retry_after: u64 },
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("no {service} token available")]
    TokenUnavailable { service: String },

    #[error("no playable URL for post {post_id}: {reason}")]
    ResolutionFailed { post_id: String, reason: String },

    #[error("downloading {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("message rejected: {description}")]
    Rejected { description: String },

    #[error("Bot API answered HTTP {status_code}")]
    HttpStatus { status_code: u16 },

    #[error("cannot read {path}")]
    FileUnreadable { path: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("cannot open store: {reason}")]
    ConnectionFailed { reason: String },

    #[error("schema migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("database is locked")]
    DatabaseLocked,

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}")]
    FileNotFound { path: String },

    #[error("{field} has an invalid value: {value}")]
    InvalidValue { field: String, value: String },

    #[error("required environment variables not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
}
