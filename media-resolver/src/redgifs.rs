use async_trait::async_trait;
use relay_core::{CoreError, MediaError, TokenSource};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

pub const REDGIFS_API_BASE: &str = "https://api.redgifs.com";

/// Redgifs temporary tokens live for an hour.
pub const REDGIFS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
pub const REDGIFS_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct TemporaryToken {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GifResponse {
    #[serde(default)]
    gif: Option<Gif>,
}

#[derive(Debug, Deserialize)]
struct Gif {
    #[serde(default)]
    urls: GifUrls,
}

#[derive(Debug, Default, Deserialize)]
struct GifUrls {
    hd: Option<String>,
    sd: Option<String>,
}

/// Extracts the clip id from `/watch/<id>` or from the last path segment.
pub fn extract_gif_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let id = match segments.iter().position(|segment| *segment == "watch") {
        Some(index) => segments.get(index + 1)?,
        None => segments.last()?,
    };
    Some(id.to_string())
}

pub struct RedgifsClient {
    http_client: Client,
    api_base: String,
}

impl RedgifsClient {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_base_url(REDGIFS_API_BASE.to_string())
    }

    pub fn with_base_url(api_base: String) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Looks up the playable URL of a clip, preferring the HD rendition.
    pub async fn lookup(&self, token: &str, gif_id: &str) -> Result<String, CoreError> {
        let url = format!("{}/v2/gifs/{}", self.api_base, gif_id);
        debug!("Looking up Redgifs clip {}", gif_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            error!("Redgifs rejected the access token");
            return Err(MediaError::TokenUnavailable {
                service: "redgifs".to_string(),
            }
            .into());
        }
        if !status.is_success() {
            error!("Failed to get Redgifs video URL: {}", status);
            return Err(MediaError::ResolutionFailed {
                post_id: gif_id.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            }
            .into());
        }

        let body: GifResponse = response.json().await?;
        let urls = body.gif.map(|gif| gif.urls).unwrap_or_default();
        urls.hd.or(urls.sd).ok_or_else(|| {
            MediaError::ResolutionFailed {
                post_id: gif_id.to_string(),
                reason: "no hd or sd rendition".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl TokenSource for RedgifsClient {
    fn service(&self) -> &str {
        "redgifs"
    }

    async fn fetch_token(&self) -> Result<String, CoreError> {
        let url = format!("{}/v2/auth/temporary", self.api_base);
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MediaError::TokenUnavailable {
                service: format!("redgifs (HTTP {})", response.status().as_u16()),
            }
            .into());
        }

        let body: TemporaryToken = response.json().await?;
        body.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            MediaError::TokenUnavailable {
                service: "redgifs".to_string(),
            }
            .into()
        })
    }
}
