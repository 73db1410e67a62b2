use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use relay_core::{
    CandidatePost, CoreError, MediaDescriptor, RankingWindow, RedditApiError, SubredditSummary,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

const POST_KIND: &str = "t3";
const SUBREDDIT_KIND: &str = "t5";

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_video: Option<bool>,
    #[serde(default)]
    pub media: Option<RedditMedia>,
    #[serde(default)]
    pub over_18: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditSubredditData {
    pub display_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(default)]
    pub over18: Option<bool>,
}

impl From<RedditPostData> for CandidatePost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            url: post_data.url,
            score: post_data.score,
            is_video: post_data.is_video,
            media: post_data.media.map(|media| MediaDescriptor {
                fallback_url: media.reddit_video.and_then(|video| video.fallback_url),
            }),
        }
    }
}

impl From<RedditSubredditData> for SubredditSummary {
    fn from(data: RedditSubredditData) -> Self {
        Self {
            name: data.display_name,
            title: data.title,
            subscribers: data.subscribers,
            over18: data.over18.unwrap_or(false),
        }
    }
}

/// Maps a non-success status to the matching API error.
fn status_error(status: StatusCode, resource: &str, retry_after: Option<u64>) -> CoreError {
    let error = match status.as_u16() {
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: resource.to_string(),
        },
        404 => RedditApiError::SubredditNotFound {
            subreddit: resource.to_string(),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, resource),
        },
    };
    CoreError::RedditApi(error)
}

/// Reddit's `x-ratelimit-remaining` and `x-ratelimit-reset` headers.
fn remaining_budget(headers: &HeaderMap) -> Option<(f64, Duration)> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<f64>().ok())
    };
    let remaining = read("x-ratelimit-remaining")?;
    let reset = read("x-ratelimit-reset")?;
    Some((remaining, Duration::from_secs_f64(reset.max(0.0))))
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    user_agent: String,
    api_base: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        Self::with_base_url(
            user_agent,
            REDDIT_API_BASE.to_string(),
            RateLimitConfig::reddit_oauth(),
        )
    }

    pub fn with_base_url(
        user_agent: String,
        api_base: String,
        rate_config: RateLimitConfig,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(rate_config),
            user_agent,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        resource: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.api_base, endpoint);

        let permit = self.rate_limiter.acquire_permit().await?;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, permit.waited
        );

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        if let Some((remaining, reset_after)) = remaining_budget(response.headers()) {
            self.rate_limiter
                .observe_remaining(remaining, reset_after)
                .await;
        }

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited, retry after {:?} seconds", retry_after);
        }

        Err(status_error(status, resource, retry_after))
    }

    /// Top posts of a subreddit over `window`, in the order Reddit ranks them.
    pub async fn get_top_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        window: RankingWindow,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit_str = limit.to_string();
        let params = [
            ("t", window.time_filter()),
            ("limit", limit_str.as_str()),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(Method::GET, &endpoint, subreddit, access_token, &params)
            .await?;

        let listing: RedditListing<serde_json::Value> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        // Unknown subreddits may redirect to a search listing of t5 children
        let mut posts = Vec::with_capacity(listing.data.children.len());
        for child in listing.data.children {
            if child.kind != POST_KIND {
                continue;
            }
            match serde_json::from_value::<RedditPostData>(child.data) {
                Ok(post) => posts.push(post),
                Err(e) => warn!("Skipping malformed post in r/{}: {}", subreddit, e),
            }
        }

        info!("Retrieved {} posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    pub async fn search_subreddits(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RedditSubredditData>, CoreError> {
        let limit_str = limit.to_string();
        let params = [
            ("q", query),
            ("limit", limit_str.as_str()),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(
                Method::GET,
                "/subreddits/search",
                "subreddit search",
                access_token,
                &params,
            )
            .await?;

        let listing: RedditListing<RedditSubredditData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit search results: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse subreddit search results".to_string(),
            })
        })?;

        let results: Vec<RedditSubredditData> = listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == SUBREDDIT_KIND)
            .map(|child| child.data)
            .collect();

        debug!("Subreddit search for '{}' returned {}", query, results.len());
        Ok(results)
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status().await
    }
}
