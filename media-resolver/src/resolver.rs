use crate::classify::is_redgifs_url;
use crate::redgifs::{extract_gif_id, RedgifsClient};
use async_trait::async_trait;
use relay_core::{CandidatePost, CoreError, MediaError, TokenCache, VideoResolver};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Resolves video candidates to a direct URL.
///
/// Shares one Redgifs token cache with every other resolver built from the
/// same handle.
pub struct MediaResolver {
    redgifs: Arc<TokenCache<RedgifsClient>>,
}

impl MediaResolver {
    pub fn new(redgifs: Arc<TokenCache<RedgifsClient>>) -> Self {
        Self { redgifs }
    }

    async fn resolve_redgifs(&self, post: &CandidatePost) -> Result<String, CoreError> {
        let gif_id = extract_gif_id(&post.url).ok_or_else(|| MediaError::ResolutionFailed {
            post_id: post.id.clone(),
            reason: format!("no clip id in {}", post.url),
        })?;

        let token = self
            .redgifs
            .get_token()
            .await
            .ok_or_else(|| MediaError::TokenUnavailable {
                service: "redgifs".to_string(),
            })?;

        let result = self.redgifs.source().lookup(&token, &gif_id).await;
        if let Err(CoreError::Media(MediaError::TokenUnavailable { .. })) = &result {
            self.redgifs.invalidate().await;
        }
        result
    }
}

#[async_trait]
impl VideoResolver for MediaResolver {
    async fn resolve_video_url(&self, post: &CandidatePost) -> Option<String> {
        if post.is_native_video() {
            let fallback = post.media.as_ref().and_then(|m| m.fallback_url.clone());
            if fallback.is_none() {
                warn!("Post {} is a native video without a fallback URL", post.id);
            }
            return fallback;
        }

        if is_redgifs_url(&post.url) {
            return match self.resolve_redgifs(post).await {
                Ok(url) => {
                    debug!("Resolved Redgifs clip for post {}", post.id);
                    Some(url)
                }
                Err(e) => {
                    error!("Error getting video URL for post {}: {}", post.id, e);
                    None
                }
            };
        }

        Some(post.url.clone())
    }
}
