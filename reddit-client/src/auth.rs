use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, TokenResponse, TokenUrl,
};
use relay_core::{ConfigError, CoreError, RedditApiError, TokenSource};
use tracing::{debug, info};

pub const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Application-only OAuth2 (client credentials grant) against Reddit.
pub struct RedditAuth {
    oauth_client: BasicClient,
    http_client: reqwest::Client,
}

impl RedditAuth {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        http_client: reqwest::Client,
    ) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "auth_url".to_string(),
                value: e.to_string(),
            }
        })?;
        let token_url = TokenUrl::new(token_url.clone()).map_err(|_| ConfigError::InvalidValue {
            field: "token_url".to_string(),
            value: token_url,
        })?;

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            oauth_client,
            http_client,
        })
    }
}

/// Sends an OAuth request through our reqwest client so Reddit sees the
/// configured User-Agent.
async fn send_oauth_request(
    http_client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

#[async_trait]
impl TokenSource for RedditAuth {
    fn service(&self) -> &str {
        "reddit"
    }

    async fn fetch_token(&self) -> Result<String, CoreError> {
        debug!("Requesting Reddit application token");
        let http_client = self.http_client.clone();

        let token = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(move |request| send_oauth_request(http_client, request))
            .await
            .map_err(|e| {
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        info!(
            "Obtained Reddit access token (expires in {:?})",
            token.expires_in()
        );
        Ok(token.access_token().secret().clone())
    }
}
