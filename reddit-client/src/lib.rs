pub mod api;
pub mod auth;
pub mod rate_limiter;
pub mod retry;


pub use api::{RedditApiClient, REDDIT_API_BASE};
pub use auth::{RedditAuth, REDDIT_TOKEN_URL};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus};
pub use retry::{CircuitBreakerState, RetryConfig, RetryExecutor, RetryStats};

use async_trait::async_trait;
use relay_core::{
    CandidatePost, ContentFetcher, CoreError, RankingWindow, RedditApiError, SourceDirectory,
    SubredditSummary, TokenCache,
};
use std::time::Duration;

/// Reddit issues application tokens for one hour.
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub api_base: String,
    pub token_url: String,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl RedditClientConfig {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
            api_base: REDDIT_API_BASE.to_string(),
            token_url: REDDIT_TOKEN_URL.to_string(),
            rate_limit: RateLimitConfig::reddit_oauth(),
            retry: RetryConfig::reddit(),
        }
    }
}

pub struct RedditClient {
    api: RedditApiClient,
    tokens: TokenCache<RedditAuth>,
    retry: RetryExecutor,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig) -> Result<Self, CoreError> {
        let auth_http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let auth = RedditAuth::new(
            config.client_id,
            config.client_secret,
            config.token_url,
            auth_http,
        )?;

        Ok(Self {
            api: RedditApiClient::with_base_url(
                config.user_agent,
                config.api_base,
                config.rate_limit,
            )?,
            tokens: TokenCache::new(auth, TOKEN_LIFETIME, TOKEN_REFRESH_MARGIN),
            retry: RetryExecutor::new(config.retry),
        })
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    pub fn circuit_breaker_state(&self) -> CircuitBreakerState {
        self.retry.breaker_state()
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        self.tokens.get_token().await.ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "no Reddit access token available".to_string(),
            })
        })
    }

    /// A rejected token is dropped so the retry re-authenticates.
    async fn forget_rejected_token<T>(
        &self,
        result: Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            self.tokens.invalidate().await;
        }
        result
    }

    async fn fetch_top_once(
        &self,
        subreddit: &str,
        window: RankingWindow,
        limit: u32,
    ) -> Result<Vec<CandidatePost>, CoreError> {
        let token = self.access_token().await?;
        let result = self.api.get_top_posts(&token, subreddit, window, limit).await;
        let posts = self.forget_rejected_token(result).await?;
        Ok(posts.into_iter().map(CandidatePost::from).collect())
    }

    async fn search_once(&self, query: &str, limit: u32) -> Result<Vec<SubredditSummary>, CoreError> {
        let token = self.access_token().await?;
        let result = self.api.search_subreddits(&token, query, limit).await;
        let found = self.forget_rejected_token(result).await?;
        Ok(found.into_iter().map(SubredditSummary::from).collect())
    }
}

#[async_trait]
impl ContentFetcher for RedditClient {
    async fn fetch_top(
        &self,
        subreddit: &str,
        window: RankingWindow,
        limit: u32,
    ) -> Result<Vec<CandidatePost>, CoreError> {
        let operation = format!("fetch_top r/{}", subreddit);
        let mut posts = self
            .retry
            .execute(&operation, move || {
                self.fetch_top_once(subreddit, window, limit)
            })
            .await?;

        // Stable, so equal scores keep Reddit's order
        posts.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(posts)
    }
}

#[async_trait]
impl SourceDirectory for RedditClient {
    async fn search_sources(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SubredditSummary>, CoreError> {
        self.retry
            .execute("search_subreddits", move || self.search_once(query, limit))
            .await
    }
}
